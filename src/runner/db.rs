//! Database validation steps: queries, row and schema assertions, timing
//! checks and cross-database comparison. Results live on the scenario's
//! [`ScenarioContext`].

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::time::Instant;

use super::context::{plain_string, ScenarioContext};
use crate::database::{
    parse_database_list, ConnectionReport, CrossDatabaseComparison, DatabaseManager,
    SchemaValidation, DATABASE_NAMES,
};
use crate::utils::Config;

/// What the database steps of one scenario produced
#[derive(Debug, Clone, Default)]
pub struct DatabaseResults {
    pub rows: Option<Vec<Value>>,
    pub affected_rows: Option<u64>,
    /// Error of the last query expected to fail; `None` if it succeeded
    pub query_error: Option<String>,
    pub execution_ms: Option<u64>,
    pub schema: Option<SchemaValidation>,
    pub comparison: Option<CrossDatabaseComparison>,
}

pub struct DatabaseSteps {
    manager: DatabaseManager,
    current: String,
}

impl DatabaseSteps {
    pub fn new(config: &Config) -> Self {
        Self::with_manager(DatabaseManager::new(
            config.database.clone(),
            config.timeouts.database_ms,
        ))
    }

    pub fn with_manager(manager: DatabaseManager) -> Self {
        Self {
            manager,
            current: DATABASE_NAMES[0].to_string(),
        }
    }

    pub fn current_database(&self) -> &str {
        &self.current
    }

    pub async fn connect(&mut self, name: &str) -> Result<()> {
        self.manager
            .connect(name)
            .await
            .with_context(|| format!("Failed to connect to {} database", name))?;
        self.current = name.to_string();
        println!("{} Connected to database: {}", "✓".green(), name);
        Ok(())
    }

    pub fn switch_to(&mut self, name: &str) -> Result<()> {
        if !DATABASE_NAMES.contains(&name) {
            bail!("Failed to switch to {} database: not configured", name);
        }
        self.current = name.to_string();
        println!("{} Switched to database: {}", "✓".green(), name);
        Ok(())
    }

    pub async fn test_connection(&self, name: &str) -> Result<ConnectionReport> {
        let report = self.manager.test_connection(name).await;
        if !report.connected {
            bail!(
                "Connection test failed for {}: {}",
                name,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!("{} Connection test successful for {}", "✓".green(), name);
        println!("   • Host: {}", report.host);
        println!("   • Port: {}", report.port);
        println!("   • Database: {}", report.database);
        Ok(report)
    }

    /// SELECT with positional parameters; rows replace the previous result
    pub async fn execute_query(
        &mut self,
        ctx: &mut ScenarioContext,
        query: &str,
        params: &[String],
        name: &str,
    ) -> Result<usize> {
        let query = ctx.substitute_vars(query);
        let rows = self
            .manager
            .execute_select(&query, params, name)
            .await
            .with_context(|| format!("Query execution failed on {}", name))?;
        let count = rows.len();
        println!("  Query executed on {}: {} rows returned", name, count);
        ctx.database_mut().rows = Some(rows);
        Ok(count)
    }

    /// SELECT while recording how long it took
    pub async fn execute_timed(
        &mut self,
        ctx: &mut ScenarioContext,
        query: &str,
        name: &str,
    ) -> Result<u64> {
        let start = Instant::now();
        let count = self.execute_query(ctx, query, &[], name).await?;
        let elapsed = start.elapsed().as_millis() as u64;
        println!("  {} rows in {}ms", count, elapsed);
        ctx.database_mut().execution_ms = Some(elapsed);
        Ok(elapsed)
    }

    /// `SELECT COUNT(*)`, stored as a single `{"count": n}` row
    pub async fn count_records(
        &mut self,
        ctx: &mut ScenarioContext,
        table: &str,
        name: &str,
    ) -> Result<i64> {
        let count = self
            .manager
            .count_records(table, name)
            .await
            .with_context(|| format!("Record count failed for {} on {}", table, name))?;
        println!("  Record count for {} on {}: {}", table, name, count);
        ctx.database_mut().rows = Some(vec![serde_json::json!({ "count": count })]);
        Ok(count)
    }

    pub async fn execute_modify(
        &mut self,
        ctx: &mut ScenarioContext,
        query: &str,
        params: &[String],
        name: &str,
    ) -> Result<u64> {
        let query = ctx.substitute_vars(query);
        let affected = self
            .manager
            .execute_modify(&query, params, name)
            .await
            .with_context(|| format!("Modify query failed on {}", name))?;
        ctx.database_mut().affected_rows = Some(affected);
        Ok(affected)
    }

    /// Run a query that is expected to fail and keep its error
    pub async fn attempt_query(&mut self, ctx: &mut ScenarioContext, query: &str, name: &str) {
        match self.manager.execute_select(query, &[], name).await {
            Ok(_) => {
                println!(
                    "{} Query executed successfully (expected to fail): {}",
                    "⚠".yellow(),
                    query
                );
                ctx.database_mut().query_error = None;
            }
            Err(e) => {
                println!("  Query failed as expected: {}", e);
                ctx.database_mut().query_error = Some(e.to_string());
            }
        }
    }

    pub async fn validate_schema(
        &mut self,
        ctx: &mut ScenarioContext,
        name: &str,
        expected_tables: &[String],
    ) -> Result<()> {
        let validation = self
            .manager
            .validate_schema(name, expected_tables)
            .await
            .with_context(|| format!("Schema validation failed for {}", name))?;
        ctx.database_mut().schema = Some(validation);
        Ok(())
    }

    /// `databases` is a comma-separated list such as `"default, testdb"`
    pub async fn compare_across(&mut self, ctx: &mut ScenarioContext, databases: &str, query: &str) {
        let names = parse_database_list(databases);
        let comparison = self.manager.compare_across(query, &names).await;
        println!(
            "  Cross-database comparison completed for databases: {}",
            names.join(", ")
        );
        ctx.database_mut().comparison = Some(comparison);
    }

    pub async fn close_all(&mut self) {
        self.manager.close_all().await;
    }
}

fn rows(ctx: &ScenarioContext) -> Result<&[Value]> {
    ctx.database()
        .rows
        .as_deref()
        .ok_or_else(|| anyhow!("No query results recorded in this scenario"))
}

fn first_row(ctx: &ScenarioContext) -> Result<&serde_json::Map<String, Value>> {
    rows(ctx)?
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("Query returned no rows"))
}

fn schema(ctx: &ScenarioContext) -> Result<&SchemaValidation> {
    ctx.database()
        .schema
        .as_ref()
        .ok_or_else(|| anyhow!("No schema validation recorded in this scenario"))
}

pub fn assert_row_count(ctx: &ScenarioContext, expected: usize) -> Result<()> {
    let actual = rows(ctx)?.len();
    if actual != expected {
        bail!("Expected {} row(s), query returned {}", expected, actual);
    }
    println!("{} Query returned expected {} row(s)", "✓".green(), expected);
    Ok(())
}

pub fn assert_min_rows(ctx: &ScenarioContext, min: usize) -> Result<()> {
    let actual = rows(ctx)?.len();
    if actual < min {
        bail!("Expected at least {} row(s), query returned {}", min, actual);
    }
    println!(
        "{} Query returned at least {} row(s): {} rows",
        "✓".green(),
        min,
        actual
    );
    Ok(())
}

pub fn assert_more_rows_than(ctx: &ScenarioContext, count: usize) -> Result<()> {
    let actual = rows(ctx)?.len();
    if actual <= count {
        bail!("Expected more than {} row(s), query returned {}", count, actual);
    }
    Ok(())
}

/// Exact column first. `SHOW TABLES` results name their column
/// `Tables_in_<db>`, so table-like columns holding the expected value match
/// next, then the first column.
pub fn assert_first_row_value(ctx: &ScenarioContext, column: &str, expected: &str) -> Result<()> {
    let row = first_row(ctx)?;
    let actual = row
        .get(column)
        .or_else(|| {
            row.iter()
                .filter(|(key, _)| {
                    key.contains("Tables_in_") || key.to_lowercase().contains("table")
                })
                .map(|(_, value)| value)
                .find(|value| plain_string(value) == expected)
        })
        .or_else(|| row.values().next())
        .filter(|value| !value.is_null())
        .map(plain_string)
        .ok_or_else(|| anyhow!("First row has no value for '{}'", column))?;

    if actual != expected {
        bail!("Column '{}': expected {}, got {}", column, expected, actual);
    }
    println!("{} Found expected value: {}", "✓".green(), actual);
    Ok(())
}

pub fn assert_first_row_has(ctx: &ScenarioContext, column: &str) -> Result<()> {
    let row = first_row(ctx)?;
    let value = row
        .get(column)
        .ok_or_else(|| anyhow!("First row has no column '{}'", column))?;
    println!(
        "{} First row has column: {} with value: {}",
        "✓".green(),
        column,
        plain_string(value)
    );
    Ok(())
}

pub fn assert_all_rows_have(ctx: &ScenarioContext, column: &str) -> Result<()> {
    let rows = rows(ctx)?;
    for (i, row) in rows.iter().enumerate() {
        if row.get(column).is_none() {
            bail!("Row {} missing column {}", i + 1, column);
        }
    }
    println!("{} All {} rows contain column: {}", "✓".green(), rows.len(), column);
    Ok(())
}

pub fn assert_table_count(ctx: &ScenarioContext, expected: usize) -> Result<()> {
    let actual = schema(ctx)?.total_tables();
    if actual != expected {
        bail!("Expected {} tables, database has {}", expected, actual);
    }
    Ok(())
}

pub fn assert_min_tables(ctx: &ScenarioContext, min: usize) -> Result<()> {
    let actual = schema(ctx)?.total_tables();
    if actual < min {
        bail!("Expected at least {} tables, database has {}", min, actual);
    }
    Ok(())
}

pub fn assert_has_table(ctx: &ScenarioContext, table: &str) -> Result<()> {
    let schema = schema(ctx)?;
    if !schema.tables.iter().any(|t| t == table) {
        bail!("Database {} has no table {}", schema.database, table);
    }
    println!("{} Database contains table: {}", "✓".green(), table);
    Ok(())
}

pub fn assert_expected_tables_present(ctx: &ScenarioContext) -> Result<()> {
    let schema = schema(ctx)?;
    if !schema.is_valid() {
        bail!(
            "Database {} is missing tables: {}",
            schema.database,
            schema.missing_tables.join(", ")
        );
    }
    println!(
        "{} All expected tables present in {}",
        "✓".green(),
        schema.database
    );
    Ok(())
}

pub fn assert_query_time_below(ctx: &ScenarioContext, max_ms: u64) -> Result<()> {
    let elapsed = ctx
        .database()
        .execution_ms
        .ok_or_else(|| anyhow!("No timed query recorded in this scenario"))?;
    if elapsed >= max_ms {
        bail!("Query took {}ms, limit is {}ms", elapsed, max_ms);
    }
    println!(
        "{} Query executed in {}ms (under {}ms limit)",
        "✓".green(),
        elapsed,
        max_ms
    );
    Ok(())
}

pub fn assert_all_databases_succeeded(ctx: &ScenarioContext) -> Result<()> {
    let comparison = ctx
        .database()
        .comparison
        .as_ref()
        .ok_or_else(|| anyhow!("No cross-database comparison recorded in this scenario"))?;
    let failures = comparison.failures();
    if let Some((database, error)) = failures.first() {
        bail!(
            "{} of {} databases failed; {}: {}",
            failures.len(),
            comparison.results.len(),
            database,
            error
        );
    }
    for result in &comparison.results {
        println!(
            "{} Database {} returned {} rows",
            "✓".green(),
            result.database,
            result.row_count()
        );
    }
    Ok(())
}

pub fn assert_query_failed(ctx: &ScenarioContext) -> Result<&str> {
    ctx.database()
        .query_error
        .as_deref()
        .ok_or_else(|| anyhow!("Expected the query to fail, but it succeeded"))
}

/// Case-insensitive match on the recorded query error
pub fn assert_error_mentions(ctx: &ScenarioContext, text: &str) -> Result<()> {
    let error = assert_query_failed(ctx)?;
    if !error.to_lowercase().contains(&text.to_lowercase()) {
        bail!("Error '{}' does not mention '{}'", error, text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseQueryResult;
    use serde_json::json;

    fn ctx_with_rows(rows: Vec<Value>) -> ScenarioContext {
        let mut ctx = ScenarioContext::new("db");
        ctx.database_mut().rows = Some(rows);
        ctx
    }

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_row_count_assertions() {
        let ctx = ctx_with_rows(vec![json!({"id": 1}), json!({"id": 2})]);
        assert!(assert_row_count(&ctx, 2).is_ok());
        assert!(assert_row_count(&ctx, 1).is_err());
        assert!(assert_min_rows(&ctx, 2).is_ok());
        assert!(assert_min_rows(&ctx, 3).is_err());
        assert!(assert_more_rows_than(&ctx, 1).is_ok());
        assert!(assert_more_rows_than(&ctx, 2).is_err());
    }

    #[test]
    fn test_assertions_without_query_fail() {
        let ctx = ScenarioContext::new("empty");
        assert!(assert_row_count(&ctx, 0).is_err());
        assert!(assert_first_row_has(&ctx, "id").is_err());
        assert!(assert_table_count(&ctx, 0).is_err());
        assert!(assert_query_time_below(&ctx, 100).is_err());
        assert!(assert_all_databases_succeeded(&ctx).is_err());
        assert!(assert_query_failed(&ctx).is_err());
    }

    #[test]
    fn test_first_row_value_compares_as_text() {
        let ctx = ctx_with_rows(vec![json!({
            "ACCOUNT_ID": 18446744073709551615u64,
            "BALANCE": "1250.50",
            "CREATED_AT": "2024-05-01 10:00:00",
            "NOTE": null
        })]);
        assert!(assert_first_row_value(&ctx, "ACCOUNT_ID", "18446744073709551615").is_ok());
        assert!(assert_first_row_value(&ctx, "BALANCE", "1250.50").is_ok());
        assert!(assert_first_row_value(&ctx, "CREATED_AT", "2024-05-01 10:00:00").is_ok());
        assert!(assert_first_row_value(&ctx, "BALANCE", "1250.5").is_err());
        assert!(assert_first_row_value(&ctx, "NOTE", "null").is_err());
    }

    #[test]
    fn test_first_row_value_for_show_tables() {
        let ctx = ctx_with_rows(vec![json!({"Tables_in_testdb (ACCOUNT%)": "ACCOUNT_BLOCK"})]);
        assert!(assert_first_row_value(&ctx, "table_name", "ACCOUNT_BLOCK").is_ok());
        assert!(assert_first_row_value(&ctx, "table_name", "CUSTOMER").is_err());

        let empty = ctx_with_rows(Vec::new());
        assert!(assert_first_row_value(&empty, "id", "1").is_err());
    }

    #[test]
    fn test_column_presence() {
        let ctx = ctx_with_rows(vec![json!({"id": 1, "name": "a"}), json!({"id": 2})]);
        assert!(assert_first_row_has(&ctx, "name").is_ok());
        assert!(assert_all_rows_have(&ctx, "id").is_ok());
        let err = assert_all_rows_have(&ctx, "name").unwrap_err();
        assert_eq!(err.to_string(), "Row 2 missing column name");
    }

    #[test]
    fn test_schema_assertions() {
        let mut ctx = ScenarioContext::new("schema");
        ctx.database_mut().schema = Some(SchemaValidation::compare(
            "testdb",
            tables(&["ACCOUNT_BLOCK", "CUSTOMER"]),
            &tables(&["CUSTOMER", "KYC_STATUS"]),
        ));

        assert!(assert_table_count(&ctx, 2).is_ok());
        assert!(assert_min_tables(&ctx, 1).is_ok());
        assert!(assert_min_tables(&ctx, 3).is_err());
        assert!(assert_has_table(&ctx, "CUSTOMER").is_ok());
        assert!(assert_has_table(&ctx, "KYC_STATUS").is_err());
        let err = assert_expected_tables_present(&ctx).unwrap_err();
        assert!(err.to_string().contains("KYC_STATUS"));
    }

    #[test]
    fn test_query_time_limit_is_exclusive() {
        let mut ctx = ScenarioContext::new("timed");
        ctx.database_mut().execution_ms = Some(250);
        assert!(assert_query_time_below(&ctx, 300).is_ok());
        assert!(assert_query_time_below(&ctx, 250).is_err());
    }

    #[test]
    fn test_cross_database_assertion() {
        let mut ctx = ScenarioContext::new("compare");
        ctx.database_mut().comparison = Some(CrossDatabaseComparison {
            query: "SELECT 1".into(),
            results: vec![
                DatabaseQueryResult {
                    database: "default".into(),
                    rows: Ok(vec![json!({"1": 1})]),
                },
                DatabaseQueryResult {
                    database: "testdb".into(),
                    rows: Err("Access denied".into()),
                },
            ],
        });
        let err = assert_all_databases_succeeded(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 databases failed; testdb: Access denied");
    }

    #[test]
    fn test_error_mentions_is_case_insensitive() {
        let mut ctx = ScenarioContext::new("invalid");
        ctx.database_mut().query_error =
            Some("Duplicate entry '7' for key 'PRIMARY'".to_string());
        assert!(assert_error_mentions(&ctx, "duplicate ENTRY").is_ok());
        assert!(assert_error_mentions(&ctx, "foreign key").is_err());
    }

    #[test]
    fn test_switch_to_known_databases_only() {
        let mut steps = DatabaseSteps::new(&Config::default());
        assert_eq!(steps.current_database(), "default");
        steps.switch_to("testdb").unwrap();
        assert_eq!(steps.current_database(), "testdb");
        assert!(steps.switch_to("warehouse").is_err());
        assert_eq!(steps.current_database(), "testdb");
    }

    #[tokio::test]
    async fn test_failed_query_is_recorded_not_raised() {
        let mut steps = DatabaseSteps::new(&Config::default());
        let mut ctx = ScenarioContext::new("attempt");
        steps.attempt_query(&mut ctx, "SELECT 1", "warehouse").await;
        assert!(assert_error_mentions(&ctx, "configuration not found").is_ok());

        steps
            .compare_across(&mut ctx, "warehouse, archive", "SELECT 1")
            .await;
        let comparison = ctx.database().comparison.as_ref().unwrap();
        assert_eq!(comparison.results.len(), 2);
        assert!(assert_all_databases_succeeded(&ctx).is_err());
    }
}
