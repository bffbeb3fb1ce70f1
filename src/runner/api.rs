//! REST step definitions: named endpoints, request files under
//! `<test_data_dir>/api/<ENDPOINT>/`, and assertions on the last response.

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use log::{debug, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::context::{plain_string, value_at_path, ApiResponse, ScenarioContext};
use crate::utils::Config;

pub const ENDPOINTS: &[(&str, &str)] = &[
    ("GET_USERS", "/users"),
    ("POST_USERS", "/users"),
    ("PUT_USERS", "/users"),
    ("DELETE_USERS", "/users"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// `<base>/<endpoint>[/<path_param>]`
pub fn build_url(base_url: &str, endpoint_key: &str, path_param: Option<&str>) -> Result<String> {
    let endpoint = ENDPOINTS
        .iter()
        .find(|(key, _)| *key == endpoint_key)
        .map(|(_, path)| *path)
        .ok_or_else(|| anyhow!("Unknown endpoint: {}", endpoint_key))?;
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), endpoint);
    if let Some(param) = path_param.filter(|p| !p.is_empty()) {
        url.push('/');
        url.push_str(param);
    }
    Ok(url)
}

/// One API call as written in a step
#[derive(Debug, Clone)]
pub struct ApiCall<'a> {
    pub method: Method,
    pub endpoint: &'a str,
    pub path_param: Option<&'a str>,
    pub header_file: Option<&'a str>,
    pub body: Option<Value>,
}

impl<'a> ApiCall<'a> {
    pub fn new(method: Method, endpoint: &'a str) -> Self {
        Self {
            method,
            endpoint,
            path_param: None,
            header_file: None,
            body: None,
        }
    }

    pub fn path_param(mut self, param: &'a str) -> Self {
        self.path_param = Some(param);
        self
    }

    pub fn header_file(mut self, file: &'a str) -> Self {
        self.header_file = Some(file);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct ApiSteps {
    client: reqwest::Client,
    base_url: String,
    data_dir: PathBuf,
}

impl ApiSteps {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeouts.api_ms))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            data_dir: config.paths.test_data_dir.join("api"),
        })
    }

    /// JSON file from `api/<endpoint>/<file>`; unreadable files yield `None`
    pub fn read_json_file(&self, endpoint: &str, file: &str) -> Option<Value> {
        let path = self.data_dir.join(endpoint).join(file);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Error reading file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Body from `api/<endpoint>/<file>`, `{}` when the file is missing
    pub fn body_from_file(&self, endpoint: &str, file: &str) -> Value {
        self.read_json_file(endpoint, file)
            .unwrap_or(Value::Object(Default::default()))
    }

    /// Send the request and store the response on the context. Error
    /// statuses are recorded, not returned; only a missing response fails.
    pub async fn send(&self, ctx: &mut ScenarioContext, call: ApiCall<'_>) -> Result<()> {
        let path_param = call.path_param.map(|p| ctx.substitute_vars(p));
        let url = build_url(&self.base_url, call.endpoint, path_param.as_deref())?;

        let mut request = match call.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(file) = call.header_file {
            if let Some(Value::Object(headers)) = self.read_json_file(call.endpoint, file) {
                for (name, value) in &headers {
                    request = request.header(name.as_str(), plain_string(value));
                }
            }
        }
        for (name, value) in ctx.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        println!("{} {} Request: {}", "→".blue(), call.method.as_str(), url);
        let start = Instant::now();
        let response = request
            .send()
            .await
            .with_context(|| format!("{} {} got no response", call.method.as_str(), url))?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let response_time_ms = start.elapsed().as_millis() as u64;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!("Response body: {}", body);
        println!("  Response Status: {} ({}ms)", status, response_time_ms);

        ctx.set_response(ApiResponse {
            status,
            body,
            response_time_ms,
        });
        Ok(())
    }
}

fn last_response(ctx: &ScenarioContext) -> Result<&ApiResponse> {
    ctx.last_response()
        .ok_or_else(|| anyhow!("No API response recorded in this scenario"))
}

pub fn assert_status(ctx: &ScenarioContext, expected: u16) -> Result<()> {
    let response = last_response(ctx)?;
    if response.status != expected {
        bail!(
            "Expected response status {}, got {}",
            expected,
            response.status
        );
    }
    println!("{} Response status validated: {}", "✓".green(), expected);
    Ok(())
}

/// Check `(field path, expected)` pairs. Numeric expectations compare as
/// numbers, everything else as strings.
pub fn assert_fields(ctx: &ScenarioContext, expected: &[(&str, &str)]) -> Result<()> {
    let response = last_response(ctx)?;
    for (field, want) in expected {
        let actual = value_at_path(&response.body, field);
        let matches = match (want.parse::<f64>(), actual) {
            (Ok(n), Some(value)) => value.as_f64() == Some(n),
            (Err(_), Some(value)) => value.as_str() == Some(*want),
            (_, None) => false,
        };
        if !matches {
            bail!(
                "Field '{}': expected {}, got {}",
                field,
                want,
                actual.map(Value::to_string).unwrap_or_else(|| "nothing".into())
            );
        }
        println!("{} Validated {}: {}", "✓".green(), field, want);
    }
    Ok(())
}

pub fn assert_response_time_below(ctx: &ScenarioContext, max_ms: u64) -> Result<()> {
    let response = last_response(ctx)?;
    if response.response_time_ms >= max_ms {
        bail!(
            "Response time {}ms is not below {}ms",
            response.response_time_ms,
            max_ms
        );
    }
    println!(
        "{} Response time validated: {}ms < {}ms",
        "✓".green(),
        response.response_time_ms,
        max_ms
    );
    Ok(())
}

/// Save a response field as a session variable
pub fn store_field(ctx: &mut ScenarioContext, field: &str, var_name: &str) -> Result<()> {
    let value = value_at_path(&last_response(ctx)?.body, field)
        .map(plain_string)
        .ok_or_else(|| anyhow!("Response has no field '{}'", field))?;
    println!(
        "{} Stored response field \"{}\" = \"{}\" as \"{}\"",
        "ℹ".blue(),
        field,
        value,
        var_name
    );
    ctx.set_var(var_name, &value);
    Ok(())
}
