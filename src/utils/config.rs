//! Environment-specific configuration.
//!
//! Every field resolves as: environment variable, then the per-environment
//! JSON file (`<test_data_dir>/<ENV>.json`), then a hard-coded default. The
//! resulting [`Config`] is built once at start-up and passed by reference.

use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::ci::CiInfo;

/// Point-in-time copy of the process environment.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub default_ms: u64,
    pub api_ms: u64,
    pub database_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_ms: 30_000,
            api_ms: 10_000,
            database_ms: 5_000,
        }
    }
}

/// Conventional on-disk locations used by the reporting pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub reports_dir: PathBuf,
    pub pipeline_results_dir: PathBuf,
    pub test_data_dir: PathBuf,
}

impl Default for ReportPaths {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("./reports"),
            pipeline_results_dir: PathBuf::from("./pipeline-results"),
            test_data_dir: PathBuf::from("./test-data"),
        }
    }
}

impl ReportPaths {
    pub const HTML_REPORT_DIR: &'static str = "html-report";
    pub const METADATA_FILE: &'static str = "execution-metadata.json";
    pub const STATUS_FILE: &'static str = "test_status.txt";
    pub const ELAPSED_FILE: &'static str = "execution_time.txt";

    pub fn html_report_dir(&self) -> PathBuf {
        self.reports_dir.join(Self::HTML_REPORT_DIR)
    }

    pub fn html_index(&self) -> PathBuf {
        self.html_report_dir().join("index.html")
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.reports_dir.join(Self::METADATA_FILE)
    }

    pub fn status_file(&self) -> PathBuf {
        self.pipeline_results_dir.join(Self::STATUS_FILE)
    }

    pub fn elapsed_file(&self) -> PathBuf {
        self.pipeline_results_dir.join(Self::ELAPSED_FILE)
    }

    /// All paths rooted under `base`, for tests and sandboxed runs
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            reports_dir: base.join("reports"),
            pipeline_results_dir: base.join("pipeline-results"),
            test_data_dir: base.join("test-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "testdb".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        if self.password.is_empty() {
            format!(
                "mysql://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            )
        } else {
            format!(
                "mysql://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.database
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestRailConfig {
    pub url: String,
    pub key: Option<String>,
    pub project_id: u64,
    pub suite_id: Option<u64>,
    pub close_run: bool,
}

impl Default for TestRailConfig {
    fn default() -> Self {
        Self {
            url: "https://testrail.example.com".to_string(),
            key: None,
            project_id: 51,
            suite_id: None,
            close_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: Option<String>,
    pub token: Option<String>,
    /// Scenario name to ticket key, consulted when no ticket tag is present
    pub case_mapping: BTreeMap<String, String>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        let case_mapping = [
            ("GetCompensationCategories", "GTECH-1307938"),
            ("getCompensationCategories", "GTECH-1307938"),
            ("Game Minimum Bet Limits Validation", "GTECH-1307938"),
            ("Gameplay", "GTECH-1307938"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            base_url: "https://jira.example.com".to_string(),
            email: None,
            token: None,
            case_mapping,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamsConfig {
    pub webhook_url: Option<String>,
}

/// Resolved configuration for one process
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub browser: String,
    pub headless: bool,
    pub base_url: String,
    pub api_base_url: String,
    pub timeouts: Timeouts,
    pub paths: ReportPaths,
    pub database: DatabaseConfig,
    pub testrail: TestRailConfig,
    pub jira: JiraConfig,
    pub teams: TeamsConfig,
    pub ci: CiInfo,
    /// Raw per-environment file, for dot-path lookups by step definitions
    pub test_data: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            browser: "chrome".to_string(),
            headless: true,
            base_url: "https://www.google.com".to_string(),
            api_base_url: "https://reqres.in/api".to_string(),
            timeouts: Timeouts::default(),
            paths: ReportPaths::default(),
            database: DatabaseConfig::default(),
            testrail: TestRailConfig::default(),
            jira: JiraConfig::default(),
            teams: TeamsConfig::default(),
            ci: CiInfo::default(),
            test_data: Value::Object(Default::default()),
        }
    }
}

impl Config {
    /// Resolve from the environment, reading `<test_data_dir>/<ENV>.json`
    pub fn resolve(env: &EnvSnapshot) -> Self {
        let defaults = Self::default();
        let environment = env
            .get("ENV")
            .map(str::to_string)
            .unwrap_or(defaults.environment.clone());
        let test_data_dir = env
            .get("PAW_TEST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.paths.test_data_dir.clone());

        let file = load_env_file(&test_data_dir.join(format!("{}.json", environment)));
        Self::from_sources(env, file)
    }

    /// Merge an environment snapshot over an already-parsed environment file
    pub fn from_sources(env: &EnvSnapshot, file: Option<Value>) -> Self {
        let d = Self::default();
        let file = file.unwrap_or(Value::Object(Default::default()));

        let str_from = |var: &str, pointer: &str, default: &str| -> String {
            env.get(var)
                .map(str::to_string)
                .or_else(|| file_str(&file, pointer))
                .unwrap_or_else(|| default.to_string())
        };

        let paths = ReportPaths {
            reports_dir: env
                .get("PAW_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.paths.reports_dir),
            pipeline_results_dir: env
                .get("PAW_PIPELINE_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.paths.pipeline_results_dir),
            test_data_dir: env
                .get("PAW_TEST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.paths.test_data_dir),
        };

        let timeouts = Timeouts {
            default_ms: file_u64(&file, "/timeouts/default").unwrap_or(d.timeouts.default_ms),
            api_ms: file_u64(&file, "/timeouts/api").unwrap_or(d.timeouts.api_ms),
            database_ms: file_u64(&file, "/timeouts/database").unwrap_or(d.timeouts.database_ms),
        };

        let database = DatabaseConfig {
            host: str_from("DB_HOST", "/database/host", &d.database.host),
            port: env
                .get("DB_PORT")
                .and_then(|p| p.parse().ok())
                .or_else(|| file_u64(&file, "/database/port").and_then(|p| u16::try_from(p).ok()))
                .unwrap_or(d.database.port),
            user: str_from("DB_USER", "/database/user", &d.database.user),
            password: str_from("DB_PASSWORD", "/database/password", &d.database.password),
            database: str_from("DB_NAME", "/database/database", &d.database.database),
        };

        let testrail = TestRailConfig {
            url: env
                .get("TESTRAIL_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.testrail.url),
            key: env.get("TESTRAIL_KEY").map(str::to_string),
            project_id: env
                .get("TESTRAIL_PROJECT_ID")
                .and_then(|p| p.parse().ok())
                .unwrap_or(d.testrail.project_id),
            suite_id: env.get("TESTRAIL_SUITE_ID").and_then(|s| s.parse().ok()),
            close_run: env.flag("TESTRAIL_CLOSE_RUN").unwrap_or(false),
        };

        let mut case_mapping = d.jira.case_mapping;
        if let Some(Value::Object(map)) = file.pointer("/jira/testCaseMapping") {
            for (name, ticket) in map {
                if let Some(ticket) = ticket.as_str() {
                    case_mapping.insert(name.clone(), ticket.to_string());
                }
            }
        }
        let jira = JiraConfig {
            base_url: env
                .get("JIRA_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.jira.base_url),
            email: env.get("JIRA_EMAIL").map(str::to_string),
            token: env.get("JIRA_TOKEN").map(str::to_string),
            case_mapping,
        };

        let teams = TeamsConfig {
            webhook_url: env.get("TEAMS_WEBHOOK_URL").map(str::to_string),
        };

        let config = Self {
            environment: env
                .get("ENV")
                .map(str::to_string)
                .unwrap_or(d.environment),
            browser: str_from("BROWSER", "/browser", &d.browser),
            headless: env
                .flag("HEADLESS")
                .or_else(|| file.pointer("/headless").and_then(Value::as_bool))
                .unwrap_or(d.headless),
            base_url: str_from("BASE_URL", "/baseUrl", &d.base_url),
            api_base_url: str_from("API_BASE_URL", "/apiBaseUrl", &d.api_base_url),
            timeouts,
            paths,
            database,
            testrail,
            jira,
            teams,
            ci: CiInfo::detect(env),
            test_data: file,
        };
        debug!(
            "Resolved config: env={} browser={} reports_dir={}",
            config.environment,
            config.browser,
            config.paths.reports_dir.display()
        );
        config
    }

    /// Look up a dot-separated path (`testUser.email`) in the test data.
    /// Non-string leaves are returned in their JSON form.
    pub fn lookup(&self, dotted: &str) -> Option<String> {
        let pointer = format!("/{}", dotted.replace('.', "/"));
        self.test_data.pointer(&pointer).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

fn load_env_file(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "Failed to load config file {}: {}; using defaults",
                path.display(),
                e
            );
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Config file {} is not valid JSON: {}", path.display(), e);
            None
        }
    }
}

fn file_str(file: &Value, pointer: &str) -> Option<String> {
    match file.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn file_u64(file: &Value, pointer: &str) -> Option<u64> {
    match file.pointer(pointer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
