use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, LazyLock};

use super::transport::{HttpTransport, OutboundRequest};
use super::Dispatcher;
use crate::report::types::{NormalizedReport, ScenarioStatus};
use crate::utils::config::TestRailConfig;

pub const STATUS_PASSED: u8 = 1;
pub const STATUS_FAILED: u8 = 5;

static CASE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@C(\d+)").unwrap());

/// Case id from the first `@C<digits>` tag
pub fn case_id(tags: &[String]) -> Option<u64> {
    tags.iter()
        .find_map(|tag| CASE_TAG.captures(tag))
        .and_then(|caps| caps[1].parse().ok())
}

pub struct TestRailDispatcher {
    config: TestRailConfig,
    environment: String,
    transport: Arc<dyn HttpTransport>,
}

impl TestRailDispatcher {
    pub fn new(
        config: TestRailConfig,
        environment: String,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            environment,
            transport,
        }
    }

    pub fn run_url(&self, run_id: u64) -> String {
        format!("{}/index.php?/runs/view/{}", self.config.url, run_id)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/index.php?/api/v2/{}", self.config.url, endpoint)
    }

    fn request(&self, endpoint: &str, body: serde_json::Value) -> OutboundRequest {
        OutboundRequest::new(self.api_url(endpoint), body)
            .header("Authorization", self.config.key.clone().unwrap_or_default())
            .header("Content-Type", "application/json")
    }

    async fn create_run(&self, report: &NormalizedReport) -> Result<u64> {
        let name = format!(
            "Automated Test Run - {} - {}",
            self.environment.to_uppercase(),
            Utc::now().to_rfc3339()
        );
        let description = if report.is_fallback {
            "Fallback report: primary test results were unavailable, status taken from pipeline files"
                .to_string()
        } else {
            format!(
                "{}/{} scenarios passed in {}",
                report.stats.passed(),
                report.stats.total_scenarios(),
                report.metadata.formatted_duration()
            )
        };

        let response = self
            .transport
            .post_json(self.request(
                &format!("add_run/{}", self.config.project_id),
                json!({
                    "suite_id": self.config.suite_id,
                    "name": name,
                    "description": description,
                    "include_all": false,
                    "case_ids": []
                }),
            ))
            .await?;
        let run_id = response
            .get("id")
            .and_then(|id| id.as_u64())
            .ok_or_else(|| anyhow!("TestRail add_run response has no run id"))?;
        info!("Created TestRail run: {}", run_id);
        Ok(run_id)
    }
}

#[async_trait]
impl Dispatcher for TestRailDispatcher {
    fn name(&self) -> &'static str {
        "TestRail"
    }

    fn is_enabled(&self) -> bool {
        self.config.key.is_some() && self.config.suite_id.is_some()
    }

    async fn publish(&self, report: &NormalizedReport) -> Result<usize> {
        let run_id = self.create_run(report).await?;
        let mut calls = 1;

        // Scenarios without a case tag are not reported
        for scenario in &report.scenarios {
            let Some(case) = case_id(&scenario.tags) else {
                continue;
            };
            let (status_id, comment) = match scenario.status {
                ScenarioStatus::Passed => (STATUS_PASSED, format!("Test passed: {}", scenario.name)),
                _ => (STATUS_FAILED, format!("Test failed: {}", scenario.name)),
            };
            let request = self.request(
                &format!("add_result_for_case/{}/{}", run_id, case),
                json!({ "status_id": status_id, "comment": comment }),
            );
            match self.transport.post_json(request).await {
                Ok(_) => {
                    info!("Added result for case {} in run {}", case, run_id);
                    calls += 1;
                }
                Err(e) => warn!("Failed to add result for case {}: {}", case, e),
            }
        }

        if self.config.close_run {
            match self
                .transport
                .post_json(self.request(&format!("close_run/{}", run_id), json!({})))
                .await
            {
                Ok(_) => {
                    info!("Closed TestRail run: {}", run_id);
                    calls += 1;
                }
                Err(e) => warn!("Failed to close TestRail run {}: {}", run_id, e),
            }
        }

        info!("TestRail results uploaded: {}", self.run_url(run_id));
        Ok(calls)
    }
}
