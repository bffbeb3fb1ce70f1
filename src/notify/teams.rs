use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::transport::{HttpTransport, OutboundRequest};
use super::Dispatcher;
use crate::report::types::{ExecutionMetadata, NormalizedReport, ScenarioOutcome, ScenarioStatus};
use crate::utils::config::TeamsConfig;
use crate::utils::CiInfo;

pub const COLOR_PASSED: &str = "00FF00";
pub const COLOR_FAILED: &str = "FF0000";

pub struct TeamsDispatcher {
    config: TeamsConfig,
    ci: CiInfo,
    transport: Arc<dyn HttpTransport>,
}

impl TeamsDispatcher {
    pub fn new(config: TeamsConfig, ci: CiInfo, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            ci,
            transport,
        }
    }

    /// MessageCard payload for the webhook
    pub fn build_message(&self, report: &NormalizedReport) -> Value {
        let stats = &report.stats;
        let meta = &report.metadata;
        let passed = stats.failed() == 0;
        let env = meta.environment.to_uppercase();

        let summary = if report.is_fallback {
            format!("Test Results - {} (Fallback)", env)
        } else {
            format!("Test Results - {}", env)
        };

        let mut facts = vec![
            fact("Total Scenarios", stats.total_scenarios()),
            fact("Passed", stats.passed()),
            fact("Failed", stats.failed()),
            fact("Duration", meta.formatted_duration()),
            fact("Environment", &env),
            fact("Browser", meta.browser.to_uppercase()),
        ];
        if report.is_fallback {
            facts.push(fact("Report Type", report.report_type()));
        }

        let mut sections = vec![json!({
            "activityTitle": format!(
                "🧪 Test Execution {}",
                if passed { "Passed" } else { "Failed" }
            ),
            "activitySubtitle": format!("Environment: {} | Browser: {}", env, meta.browser),
            "facts": facts,
        })];

        if !passed {
            let names = report
                .failed_scenarios()
                .map(|s| format!("• {}", s.name))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(json!({
                "activityTitle": "❌ Failed Scenarios",
                "text": names,
            }));
        }

        let mut message = json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": if passed { COLOR_PASSED } else { COLOR_FAILED },
            "summary": summary,
        });

        if let Some(pipeline_url) = &self.ci.pipeline_url {
            sections.push(json!({
                "activityTitle": "🚀 GitLab Pipeline",
                "facts": [
                    fact("Branch", self.ci.branch.as_deref().unwrap_or_default()),
                    fact("Commit", self.ci.short_sha().unwrap_or_default()),
                ],
            }));
            message["potentialAction"] = json!([{
                "@type": "OpenUri",
                "name": "View Pipeline",
                "targets": [{ "os": "default", "uri": pipeline_url }],
            }]);
        }
        message["sections"] = Value::Array(sections);
        message
    }
}

fn fact(name: &str, value: impl ToString) -> Value {
    json!({ "name": name, "value": value.to_string() })
}

/// Fixed summary used to check webhook wiring: 5 scenarios, one failed,
/// 2m 30s
pub fn sample_report(environment: &str, browser: &str) -> NormalizedReport {
    let scenarios = (1..=5)
        .map(|i| {
            let status = if i == 5 {
                ScenarioStatus::Failed
            } else {
                ScenarioStatus::Passed
            };
            ScenarioOutcome::new(
                format!("Test Scenario {}", i),
                "Sample",
                Vec::new(),
                status,
                30_000_000_000,
            )
        })
        .collect();
    NormalizedReport::new(
        scenarios,
        ExecutionMetadata::new(None, None, 150_000, browser, environment),
        false,
        None,
    )
}

#[async_trait]
impl Dispatcher for TeamsDispatcher {
    fn name(&self) -> &'static str {
        "Teams"
    }

    fn is_enabled(&self) -> bool {
        self.config.webhook_url.is_some()
    }

    async fn publish(&self, report: &NormalizedReport) -> Result<usize> {
        let url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| anyhow!("Teams webhook URL not configured"))?;
        let request = OutboundRequest::new(url, self.build_message(report))
            .header("Content-Type", "application/json");
        self.transport.post_json(request).await?;
        Ok(1)
    }
}
