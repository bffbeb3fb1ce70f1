//! MySQL access for database validation steps. One pool per configured
//! database name, opened on first use.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use colored::Colorize;
use log::info;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, ValueRef};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

use crate::utils::config::DatabaseConfig;

/// Names accepted by steps; all resolve to the environment's database
pub const DATABASE_NAMES: [&str; 2] = ["default", "testdb"];

const POOL_SIZE: u32 = 10;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)?$").unwrap());

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database configuration not found for: {0}")]
    UnknownDatabase(String),

    #[error("Invalid table name: {0}")]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Outcome of a connection probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionReport {
    pub connected: bool,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub version: Option<String>,
    pub user: Option<String>,
    pub error: Option<String>,
}

/// Tables present in a database compared with the tables a test expects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaValidation {
    pub database: String,
    pub tables: Vec<String>,
    pub missing_tables: Vec<String>,
    pub extra_tables: Vec<String>,
}

impl SchemaValidation {
    /// With no expected tables nothing is missing or extra
    pub fn compare(database: &str, tables: Vec<String>, expected: &[String]) -> Self {
        let (missing_tables, extra_tables) = if expected.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                expected
                    .iter()
                    .filter(|t| !tables.contains(t))
                    .cloned()
                    .collect(),
                tables
                    .iter()
                    .filter(|t| !expected.contains(t))
                    .cloned()
                    .collect(),
            )
        };
        Self {
            database: database.to_string(),
            tables,
            missing_tables,
            extra_tables,
        }
    }

    pub fn total_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_tables.is_empty()
    }
}

/// One database's answer to a compared query
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseQueryResult {
    pub database: String,
    pub rows: std::result::Result<Vec<Value>, String>,
}

impl DatabaseQueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossDatabaseComparison {
    pub query: String,
    pub results: Vec<DatabaseQueryResult>,
}

impl CrossDatabaseComparison {
    pub fn all_successful(&self) -> bool {
        self.results.iter().all(|r| r.rows.is_ok())
    }

    /// `(database, error)` for every database whose query failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| match &r.rows {
                Err(e) => Some((r.database.as_str(), e.as_str())),
                Ok(_) => None,
            })
            .collect()
    }
}

pub struct DatabaseManager {
    config: DatabaseConfig,
    timeout: Duration,
    pools: HashMap<String, MySqlPool>,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig, timeout_ms: u64) -> Self {
        Self {
            config,
            timeout: Duration::from_millis(timeout_ms),
            pools: HashMap::new(),
        }
    }

    fn config_for(&self, name: &str) -> Result<&DatabaseConfig> {
        if DATABASE_NAMES.contains(&name) {
            Ok(&self.config)
        } else {
            Err(DatabaseError::UnknownDatabase(name.to_string()))
        }
    }

    pub fn active_connections(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }

    /// Pool for `name`, created on first use
    pub async fn connect(&mut self, name: &str) -> Result<MySqlPool> {
        if let Some(pool) = self.pools.get(name) {
            return Ok(pool.clone());
        }
        let config = self.config_for(name)?;
        println!("{} Connecting to {} database...", "🔌".blue(), name);
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_SIZE)
            .acquire_timeout(self.timeout)
            .connect(&config.connection_url())
            .await?;
        info!("Connected to {} database", name);
        self.pools.insert(name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Open a throwaway connection and report server version and user.
    /// Failures are reported, not returned.
    pub async fn test_connection(&self, name: &str) -> ConnectionReport {
        let config = match self.config_for(name) {
            Ok(c) => c,
            Err(e) => {
                return ConnectionReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        let mut report = ConnectionReport {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            ..Default::default()
        };

        let probe = async {
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(self.timeout)
                .connect(&config.connection_url())
                .await?;
            let row = sqlx::query("SELECT 1 AS test, VERSION() AS version, USER() AS user")
                .fetch_one(&pool)
                .await?;
            let version: String = row.try_get("version")?;
            let user: String = row.try_get("user")?;
            pool.close().await;
            Ok::<_, sqlx::Error>((version, user))
        };

        match probe.await {
            Ok((version, user)) => {
                report.connected = true;
                report.version = Some(version);
                report.user = Some(user);
            }
            Err(e) => {
                println!("{} Connection test failed for {}: {}", "❌".red(), name, e);
                report.error = Some(e.to_string());
            }
        }
        report
    }

    /// Run a SELECT and return each row as a JSON object
    pub async fn execute_select(
        &mut self,
        query: &str,
        params: &[String],
        name: &str,
    ) -> Result<Vec<Value>> {
        let pool = self.connect(name).await?;
        println!(
            "{} Executing query on {}: {}",
            "📊".blue(),
            name,
            abbreviate(query)
        );
        let mut statement = sqlx::query(query);
        for param in params {
            statement = statement.bind(param.as_str());
        }
        let rows = statement.fetch_all(&pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// INSERT / UPDATE / DELETE; returns affected rows
    pub async fn execute_modify(&mut self, query: &str, params: &[String], name: &str) -> Result<u64> {
        let pool = self.connect(name).await?;
        println!(
            "{} Executing modify query on {}: {}",
            "✏️".blue(),
            name,
            abbreviate(query)
        );
        let mut statement = sqlx::query(query);
        for param in params {
            statement = statement.bind(param.as_str());
        }
        Ok(statement.execute(&pool).await?.rows_affected())
    }

    pub async fn count_records(&mut self, table: &str, name: &str) -> Result<i64> {
        if !TABLE_NAME.is_match(table) {
            return Err(DatabaseError::InvalidIdentifier(table.to_string()));
        }
        let pool = self.connect(name).await?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", table))
            .fetch_one(&pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")?)
    }

    /// Base tables of the connected schema, sorted by name
    pub async fn list_tables(&mut self, name: &str) -> Result<Vec<String>> {
        let pool = self.connect(name).await?;
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
             WHERE table_schema = DATABASE() ORDER BY table_name",
        )
        .fetch_all(&pool)
        .await?;
        Ok(tables)
    }

    pub async fn validate_schema(
        &mut self,
        name: &str,
        expected_tables: &[String],
    ) -> Result<SchemaValidation> {
        println!("{} Validating schema for {} database...", "🔍".blue(), name);
        let tables = self.list_tables(name).await?;
        let validation = SchemaValidation::compare(name, tables, expected_tables);
        info!(
            "{}: {} tables, {} missing",
            name,
            validation.total_tables(),
            validation.missing_tables.len()
        );
        Ok(validation)
    }

    /// Run the same query on every database. Failures are recorded per
    /// database and never abort the comparison.
    pub async fn compare_across(&mut self, query: &str, names: &[String]) -> CrossDatabaseComparison {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let rows = self
                .execute_select(query, &[], name)
                .await
                .map_err(|e| e.to_string());
            if let Err(e) = &rows {
                println!("{} Query failed on {}: {}", "❌".red(), name, e);
            }
            results.push(DatabaseQueryResult {
                database: name.clone(),
                rows,
            });
        }
        CrossDatabaseComparison {
            query: query.to_string(),
            results,
        }
    }

    pub async fn close_all(&mut self) {
        for (name, pool) in self.pools.drain() {
            pool.close().await;
            println!("{} Closed connection to {}", "✓".green(), name);
        }
    }
}

fn abbreviate(query: &str) -> String {
    if query.chars().count() > 100 {
        format!("{}...", query.chars().take(100).collect::<String>())
    } else {
        query.to_string()
    }
}

/// Column values as JSON. Text, signed and unsigned integers, floats and
/// booleans keep their type; dates and times become `YYYY-MM-DD HH:MM:SS`
/// strings; DECIMAL and other text-encoded values are read as strings.
fn row_to_json(row: &MySqlRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_to_json(row, i));
    }
    Value::Object(object)
}

fn column_to_json(row: &MySqlRow, i: usize) -> Value {
    if row.try_get_raw(i).map(|raw| raw.is_null()).unwrap_or(true) {
        return Value::Null;
    }
    if let Ok(s) = row.try_get::<String, _>(i) {
        Value::String(s)
    } else if let Ok(v) = row.try_get::<i64, _>(i) {
        Value::from(v)
    } else if let Ok(v) = row.try_get::<u64, _>(i) {
        Value::from(v)
    } else if let Ok(v) = row.try_get::<f64, _>(i) {
        Value::from(v)
    } else if let Ok(v) = row.try_get::<f32, _>(i) {
        Value::from(v)
    } else if let Ok(v) = row.try_get::<bool, _>(i) {
        Value::Bool(v)
    } else if let Ok(v) = row.try_get::<NaiveDateTime, _>(i) {
        Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
    } else if let Ok(v) = row.try_get::<NaiveDate, _>(i) {
        Value::String(v.format("%Y-%m-%d").to_string())
    } else if let Ok(v) = row.try_get::<NaiveTime, _>(i) {
        Value::String(v.format("%H:%M:%S").to_string())
    } else if let Ok(s) = row.try_get_unchecked::<String, _>(i) {
        Value::String(s)
    } else {
        Value::Null
    }
}

/// Split `"default, testdb"` into trimmed, non-empty names
pub fn parse_database_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DatabaseManager {
        DatabaseManager::new(DatabaseConfig::default(), 500)
    }

    #[tokio::test]
    async fn test_unknown_database_is_rejected() {
        let mut db = manager();
        let err = db.connect("warehouse").await.unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownDatabase(name) if name == "warehouse"));

        let report = db.test_connection("warehouse").await;
        assert!(!report.connected);
        assert_eq!(
            report.error.as_deref(),
            Some("Database configuration not found for: warehouse")
        );
    }

    #[tokio::test]
    async fn test_count_records_validates_table_name() {
        let mut db = manager();
        let err = db.count_records("users; DROP TABLE x", "default").await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidIdentifier(_)));
        assert!(db.active_connections().is_empty());
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_schema_validation_reports_missing_and_extra() {
        let found = names(&["ACCOUNT_BLOCK", "CUSTOMER", "AUDIT_LOG"]);
        let validation =
            SchemaValidation::compare("testdb", found.clone(), &names(&["CUSTOMER", "KYC_STATUS"]));
        assert_eq!(validation.total_tables(), 3);
        assert_eq!(validation.missing_tables, names(&["KYC_STATUS"]));
        assert_eq!(validation.extra_tables, names(&["ACCOUNT_BLOCK", "AUDIT_LOG"]));
        assert!(!validation.is_valid());

        let unconstrained = SchemaValidation::compare("testdb", found, &[]);
        assert!(unconstrained.is_valid());
        assert!(unconstrained.extra_tables.is_empty());
    }

    #[tokio::test]
    async fn test_compare_across_records_each_failure() {
        let mut db = manager();
        let comparison = db
            .compare_across("SELECT 1", &names(&["warehouse", "archive"]))
            .await;
        assert_eq!(comparison.results.len(), 2);
        assert!(!comparison.all_successful());
        assert_eq!(
            comparison.failures(),
            vec![
                ("warehouse", "Database configuration not found for: warehouse"),
                ("archive", "Database configuration not found for: archive"),
            ]
        );
        assert_eq!(comparison.results[0].row_count(), 0);
    }

    #[test]
    fn test_parse_database_list() {
        assert_eq!(parse_database_list(" default, testdb ,,"), names(&["default", "testdb"]));
        assert!(parse_database_list("").is_empty());
    }

    #[test]
    fn test_abbreviate_long_queries() {
        assert_eq!(abbreviate("SELECT 1"), "SELECT 1");
        let long = format!("SELECT {} FROM t", "a, ".repeat(50));
        let short = abbreviate(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 103);
    }
}
