use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Instant;

use super::db::DatabaseResults;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").unwrap());

/// Last HTTP response seen by a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub response_time_ms: u64,
}

/// Per-scenario state. A fresh context is created before every scenario and
/// dropped after it, so nothing leaks between scenarios.
#[derive(Debug)]
pub struct ScenarioContext {
    pub name: String,
    started: Instant,
    /// Headers added to every API request of this scenario
    headers: BTreeMap<String, String>,
    /// Session variables (stored response fields and step values)
    vars: HashMap<String, String>,
    last_response: Option<ApiResponse>,
    database: DatabaseResults,
}

impl ScenarioContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
            headers: BTreeMap::new(),
            vars: HashMap::new(),
            last_response: None,
            database: DatabaseResults::default(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        let substituted = self.substitute_vars(value);
        self.headers.insert(name.to_string(), substituted);
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn clear_dynamic_headers(&mut self) {
        self.headers.clear();
    }

    pub fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        let substituted = self.substitute_vars(value);
        self.vars.insert(name.to_string(), substituted);
    }

    pub fn last_response(&self) -> Option<&ApiResponse> {
        self.last_response.as_ref()
    }

    pub fn set_response(&mut self, response: ApiResponse) {
        self.last_response = Some(response);
    }

    /// Results of this scenario's database steps
    pub fn database(&self) -> &DatabaseResults {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut DatabaseResults {
        &mut self.database
    }

    /// Substitute `${name}` or `${name.json.path}` patterns in a string.
    /// Unknown names are left as written.
    pub fn substitute_vars(&self, text: &str) -> String {
        VAR_PATTERN.replace_all(text, |caps: &regex::Captures| {
            let key = &caps[1];

            if let Some(val) = self.get_var(key) {
                return val;
            }

            match key {
                "time" => return chrono::Local::now().format("%H:%M:%S").to_string(),
                "date" => return chrono::Local::now().format("%Y-%m-%d").to_string(),
                "timestamp" => return chrono::Utc::now().timestamp_millis().to_string(),
                _ => {}
            }

            // `${user.address.city}` reads into a variable holding JSON
            if let Some((var_name, path)) = key.split_once('.') {
                if let Some(target) = self
                    .get_var(var_name)
                    .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
                    .and_then(|json| value_at_path(&json, path).map(plain_string))
                {
                    return target;
                }
            }

            format!("${{{}}}", key)
        })
        .to_string()
    }
}

/// Follow a dot-separated path through objects (and array indexes)
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Strings without quotes, everything else in JSON form
pub fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitute_vars() {
        let mut ctx = ScenarioContext::new("vars");
        ctx.set_var("userId", "7");
        ctx.set_var("user", r#"{"name": "Ana", "address": {"city": "Hanoi"}}"#);

        assert_eq!(ctx.substitute_vars("/users/${userId}"), "/users/7");
        assert_eq!(ctx.substitute_vars("${user.address.city}"), "Hanoi");
        assert_eq!(ctx.substitute_vars("${missing}"), "${missing}");
        assert!(!ctx.substitute_vars("${timestamp}").contains('$'));
    }

    #[test]
    fn test_headers_are_scenario_local() {
        let mut ctx = ScenarioContext::new("first");
        ctx.set_var("token", "abc");
        ctx.set_header("Authorization", "Bearer ${token}");
        assert_eq!(
            ctx.headers().get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
        ctx.clear_dynamic_headers();
        assert!(ctx.headers().is_empty());

        let next = ScenarioContext::new("second");
        assert!(next.headers().is_empty());
        assert_eq!(next.get_var("token"), None);
    }

    #[test]
    fn test_value_at_path() {
        let body = json!({"data": {"id": 2, "tags": ["a", "b"]}});
        assert_eq!(value_at_path(&body, "data.id"), Some(&json!(2)));
        assert_eq!(value_at_path(&body, "data.tags.1"), Some(&json!("b")));
        assert_eq!(value_at_path(&body, "data.missing"), None);
        assert_eq!(plain_string(&json!("x")), "x");
        assert_eq!(plain_string(&json!(2)), "2");
    }
}
