use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use handlebars::Handlebars;
use log::{info, warn};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use super::transport::{HttpTransport, OutboundRequest};
use super::Dispatcher;
use crate::report::types::{ExecutionStats, NormalizedReport, ScenarioOutcome};
use crate::utils::config::JiraConfig;
use crate::utils::CiInfo;

const SUCCESS_TEMPLATE: &str = include_str!("../../templates/jira_success.hbs");
const FAILURE_TEMPLATE: &str = include_str!("../../templates/jira_failure.hbs");
const GITLAB_TEMPLATE: &str = include_str!("../../templates/jira_gitlab.hbs");

static TICKET_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Z]+-\d+)").unwrap());

/// Ticket key from the first `@<PROJECT>-<digits>` tag, else from the
/// name lookup table
pub fn resolve_ticket(scenario: &ScenarioOutcome, mapping: &BTreeMap<String, String>) -> Option<String> {
    let from_tag = scenario
        .tags
        .iter()
        .find_map(|tag| TICKET_TAG.captures(tag).map(|caps| caps[1].to_string()));
    from_tag.or_else(|| mapping.get(&scenario.name).cloned())
}

/// Group scenarios by ticket, in order of first appearance. Scenarios that
/// resolve to no ticket are left out.
pub fn group_by_ticket<'a>(
    scenarios: &'a [ScenarioOutcome],
    mapping: &BTreeMap<String, String>,
) -> Vec<(String, Vec<&'a ScenarioOutcome>)> {
    let mut groups: Vec<(String, Vec<&ScenarioOutcome>)> = Vec::new();
    for scenario in scenarios {
        let Some(ticket) = resolve_ticket(scenario, mapping) else {
            continue;
        };
        match groups.iter_mut().find(|(t, _)| *t == ticket) {
            Some((_, list)) => list.push(scenario),
            None => groups.push((ticket, vec![scenario])),
        }
    }
    groups
}

pub struct JiraDispatcher {
    config: JiraConfig,
    ci: CiInfo,
    transport: Arc<dyn HttpTransport>,
    templates: Handlebars<'static>,
}

impl JiraDispatcher {
    pub fn new(config: JiraConfig, ci: CiInfo, transport: Arc<dyn HttpTransport>) -> Self {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        templates.set_strict_mode(true);
        Self {
            config,
            ci,
            transport,
            templates,
        }
    }

    pub fn build_comment(
        &self,
        report: &NormalizedReport,
        scenarios: &[&ScenarioOutcome],
    ) -> Result<String> {
        let stats = ExecutionStats::from_outcomes(scenarios.iter().copied());
        let details = scenarios
            .iter()
            .map(|s| format!("• {}: {}", s.name, s.status))
            .collect::<Vec<_>>()
            .join("\n");
        let failed = scenarios
            .iter()
            .filter(|s| s.status == crate::report::types::ScenarioStatus::Failed)
            .map(|s| format!("• {}", s.name))
            .collect::<Vec<_>>()
            .join("\n");

        let data = json!({
            "environment": report.metadata.environment,
            "browser": report.metadata.browser,
            "duration": report.metadata.formatted_duration(),
            "passedScenarios": stats.passed(),
            "totalScenarios": stats.total_scenarios(),
            "fallback": report.is_fallback,
            "testDetails": details,
            "failedTests": failed,
            "timestamp": Utc::now().to_rfc3339(),
            "testRailSection": "",
            "gitlabSection": self.gitlab_section()?,
        });
        let template = if stats.failed() == 0 {
            SUCCESS_TEMPLATE
        } else {
            FAILURE_TEMPLATE
        };
        Ok(self.templates.render_template(template, &data)?)
    }

    fn gitlab_section(&self) -> Result<String> {
        let Some(pipeline_url) = &self.ci.pipeline_url else {
            return Ok(String::new());
        };
        let data = json!({
            "pipelineUrl": pipeline_url,
            "jobUrl": self.ci.job_url.clone().unwrap_or_default(),
            "projectUrl": self.ci.project_url.clone().unwrap_or_default(),
        });
        Ok(self.templates.render_template(GITLAB_TEMPLATE, &data)?)
    }

    fn comment_request(&self, ticket: &str, comment: String) -> OutboundRequest {
        let credentials = format!(
            "{}:{}",
            self.config.email.as_deref().unwrap_or_default(),
            self.config.token.as_deref().unwrap_or_default()
        );
        let auth = base64::engine::general_purpose::STANDARD.encode(credentials);
        OutboundRequest::new(
            format!("{}/rest/api/2/issue/{}/comment", self.config.base_url, ticket),
            json!({ "body": comment }),
        )
        .header("Authorization", format!("Basic {}", auth))
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .header("X-Atlassian-Token", "no-check")
    }
}

#[async_trait]
impl Dispatcher for JiraDispatcher {
    fn name(&self) -> &'static str {
        "Jira"
    }

    fn is_enabled(&self) -> bool {
        self.config.token.is_some()
    }

    async fn publish(&self, report: &NormalizedReport) -> Result<usize> {
        let groups = group_by_ticket(&report.scenarios, &self.config.case_mapping);
        if groups.is_empty() {
            info!("No scenarios map to a Jira ticket");
            return Ok(0);
        }

        let mut posted = 0;
        for (ticket, scenarios) in &groups {
            let comment = self.build_comment(report, scenarios)?;
            match self
                .transport
                .post_json(self.comment_request(ticket, comment))
                .await
            {
                Ok(_) => {
                    info!("Posted test results to Jira ticket: {}", ticket);
                    posted += 1;
                }
                Err(e) => warn!("Failed to post to Jira ticket {}: {}", ticket, e),
            }
        }

        if posted == 0 {
            bail!("no Jira comment could be posted ({} tickets)", groups.len());
        }
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::transport::testing::RecordingTransport;
    use crate::notify::transport::TransportError;
    use crate::notify::{dispatch, DispatchOutcome};
    use crate::report::types::{ExecutionMetadata, ScenarioStatus};

    fn scenario(name: &str, tags: &[&str], status: ScenarioStatus) -> ScenarioOutcome {
        ScenarioOutcome::new(name, "F", tags.iter().map(|t| t.to_string()), status, 0)
    }

    fn config() -> JiraConfig {
        JiraConfig {
            base_url: "https://jira.example".into(),
            email: Some("qa@example.com".into()),
            token: Some("tok".into()),
            ..Default::default()
        }
    }

    fn report(scenarios: Vec<ScenarioOutcome>, is_fallback: bool) -> NormalizedReport {
        NormalizedReport::new(
            scenarios,
            ExecutionMetadata::new(None, None, 65_000, "chrome", "test"),
            is_fallback,
            None,
        )
    }

    #[test]
    fn test_tag_takes_precedence_over_mapping() {
        let mapping = JiraConfig::default().case_mapping;
        let tagged = scenario("Gameplay", &["@GTECH-5551212"], ScenarioStatus::Passed);
        assert_eq!(resolve_ticket(&tagged, &mapping).as_deref(), Some("GTECH-5551212"));

        let mapped = scenario("Gameplay", &["@smoke"], ScenarioStatus::Passed);
        assert_eq!(resolve_ticket(&mapped, &mapping).as_deref(), Some("GTECH-1307938"));

        let neither = scenario("Login works", &["@C100"], ScenarioStatus::Passed);
        assert_eq!(resolve_ticket(&neither, &mapping), None);
    }

    #[test]
    fn test_grouping_excludes_unmapped() {
        let mapping = JiraConfig::default().case_mapping;
        let scenarios = vec![
            scenario("a", &["@ABC-1"], ScenarioStatus::Passed),
            scenario("b", &[], ScenarioStatus::Passed),
            scenario("c", &["@ABC-1"], ScenarioStatus::Failed),
            scenario("Gameplay", &[], ScenarioStatus::Passed),
        ];
        let groups = group_by_ticket(&scenarios, &mapping);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "ABC-1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "GTECH-1307938");
    }

    #[tokio::test]
    async fn test_one_comment_per_ticket() {
        let transport = Arc::new(RecordingTransport::ok());
        let ci = CiInfo {
            pipeline_url: Some("https://gitlab.example/pipelines/5".into()),
            ..Default::default()
        };
        let dispatcher = JiraDispatcher::new(config(), ci, transport.clone());
        let report = report(
            vec![
                scenario("a", &["@ABC-1"], ScenarioStatus::Passed),
                scenario("c", &["@ABC-1"], ScenarioStatus::Failed),
                scenario("untracked", &[], ScenarioStatus::Failed),
            ],
            false,
        );

        assert_eq!(dispatcher.publish(&report).await.unwrap(), 1);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://jira.example/rest/api/2/issue/ABC-1/comment");
        assert_eq!(requests[0].header_value("X-Atlassian-Token"), Some("no-check"));
        assert_eq!(
            requests[0].header_value("Authorization"),
            Some("Basic cWFAZXhhbXBsZS5jb206dG9r")
        );

        let body = requests[0].body["body"].as_str().unwrap();
        assert!(body.starts_with("❌ Test Execution Failed"));
        assert!(body.contains("Scenarios: 1/2 passed"));
        assert!(body.contains("• c: FAILED"));
        assert!(body.contains("Execution Time: 1m 5s"));
        assert!(body.contains("[View Pipeline](https://gitlab.example/pipelines/5)"));
        assert!(!body.contains("untracked"));
    }

    #[test]
    fn test_fallback_comment_is_flagged() {
        let transport = Arc::new(RecordingTransport::ok());
        let dispatcher = JiraDispatcher::new(config(), CiInfo::default(), transport);
        let report = report(vec![scenario("a", &["@ABC-1"], ScenarioStatus::Passed)], true);
        let refs: Vec<&ScenarioOutcome> = report.scenarios.iter().collect();

        let comment = dispatcher.build_comment(&report, &refs).unwrap();
        assert!(comment.starts_with("✅ Test Execution Successful"));
        assert!(comment.contains("Fallback Report"));
        assert!(!comment.contains("View Pipeline"));
    }

    fn failing_for(ticket: &'static str) -> Arc<RecordingTransport> {
        Arc::new(RecordingTransport::new(move |req| {
            if ticket == "*" || req.url.contains(ticket) {
                Err(TransportError::Status {
                    status: 404,
                    body: "Issue does not exist".into(),
                })
            } else {
                Ok(serde_json::Value::Null)
            }
        }))
    }

    fn two_tickets() -> NormalizedReport {
        report(
            vec![
                scenario("a", &["@ABC-1"], ScenarioStatus::Passed),
                scenario("b", &["@ABC-2"], ScenarioStatus::Failed),
            ],
            false,
        )
    }

    #[tokio::test]
    async fn test_all_comments_failing_is_a_failed_dispatch() {
        let transport = failing_for("*");
        let dispatcher = JiraDispatcher::new(config(), CiInfo::default(), transport.clone());

        let outcome = dispatch(&dispatcher, &two_tickets()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(ref e) if e.contains("2 tickets")));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_is_still_delivered() {
        let transport = failing_for("ABC-1");
        let dispatcher = JiraDispatcher::new(config(), CiInfo::default(), transport.clone());

        let outcome = dispatch(&dispatcher, &two_tickets()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { calls: 1 });
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_disabled_without_token() {
        let transport = Arc::new(RecordingTransport::ok());
        let dispatcher = JiraDispatcher::new(JiraConfig::default(), CiInfo::default(), transport);
        assert!(!dispatcher.is_enabled());
    }
}
