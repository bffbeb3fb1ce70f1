//! Serde model of the BDD runner's JSON report.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! runner's output is ignored. Every field is defaulted so partially written
//! reports still deserialize.

use serde::{Deserialize, Serialize};

use super::types::{ScenarioOutcome, ScenarioStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    pub uri: String,
    pub id: String,
    pub keyword: String,
    pub name: String,
    pub description: String,
    pub elements: Vec<Element>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    pub id: String,
    pub keyword: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub steps: Vec<Step>,
    pub tags: Vec<Tag>,
}

impl Element {
    /// Only `type: "scenario"` elements count; backgrounds and untyped
    /// elements are ignored
    pub fn is_scenario(&self) -> bool {
        matches!(self.kind.as_deref(), Some("scenario"))
    }

    pub fn classify(&self) -> ScenarioStatus {
        let mut has_skipped = false;
        for step in &self.steps {
            match step.result.as_ref().map(|r| r.status.as_str()) {
                Some("failed") => return ScenarioStatus::Failed,
                Some("skipped") | Some("pending") => has_skipped = true,
                _ => {}
            }
        }
        if has_skipped {
            ScenarioStatus::Skipped
        } else {
            ScenarioStatus::Passed
        }
    }

    pub fn duration_nanos(&self) -> u64 {
        self.steps
            .iter()
            .filter_map(|s| s.result.as_ref())
            .map(|r| r.duration.unwrap_or(0))
            .fold(0u64, |acc, d| acc.saturating_add(d))
    }

    pub fn to_outcome(&self, feature_name: &str) -> ScenarioOutcome {
        ScenarioOutcome::new(
            self.name.clone(),
            feature_name,
            self.tags.iter().map(|t| t.name.clone()),
            self.classify(),
            self.duration_nanos(),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub keyword: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepResult {
    pub status: String,
    /// Nanoseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub name: String,
}

/// Flatten features into classified scenarios, preserving report order
pub fn outcomes_from_features(features: &[Feature]) -> Vec<ScenarioOutcome> {
    features
        .iter()
        .flat_map(|feature| {
            feature
                .elements
                .iter()
                .filter(|e| e.is_scenario())
                .map(move |e| e.to_outcome(&feature.name))
        })
        .collect()
}

/// Rebuild a runner-format report from classified outcomes, one feature per
/// distinct feature name. Used to feed the renderer when no primary report
/// file exists.
pub fn features_from_outcomes(outcomes: &[ScenarioOutcome]) -> Vec<Feature> {
    let mut features: Vec<Feature> = Vec::new();
    for outcome in outcomes {
        let element = Element {
            id: slug(&outcome.name),
            keyword: "Scenario".to_string(),
            name: outcome.name.clone(),
            kind: Some("scenario".to_string()),
            steps: vec![Step {
                keyword: "Given ".to_string(),
                name: "Test execution was attempted".to_string(),
                result: Some(StepResult {
                    status: outcome.status.step_status().to_string(),
                    duration: Some(outcome.duration_nanos),
                    error_message: None,
                }),
            }],
            tags: outcome
                .tags
                .iter()
                .map(|t| Tag { name: t.clone() })
                .collect(),
        };

        match features.iter_mut().find(|f| f.name == outcome.feature_name) {
            Some(feature) => feature.elements.push(element),
            None => features.push(Feature {
                uri: format!("features/{}.feature", slug(&outcome.feature_name)),
                id: slug(&outcome.feature_name),
                keyword: "Feature".to_string(),
                name: outcome.feature_name.clone(),
                description: String::new(),
                elements: vec![element],
                tags: Vec::new(),
            }),
        }
    }
    features
}

fn slug(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(status: &str, duration: u64) -> Step {
        Step {
            keyword: "Given ".into(),
            name: "a step".into(),
            result: Some(StepResult {
                status: status.into(),
                duration: Some(duration),
                error_message: None,
            }),
        }
    }

    fn element(steps: Vec<Step>) -> Element {
        Element {
            name: "scenario".into(),
            kind: Some("scenario".into()),
            steps,
            ..Default::default()
        }
    }

    #[test]
    fn test_failure_dominates_regardless_of_order() {
        let orders = [
            vec!["failed", "skipped", "passed"],
            vec!["passed", "failed", "skipped"],
            vec!["skipped", "passed", "failed"],
        ];
        for order in orders {
            let e = element(order.iter().map(|s| step(s, 1)).collect());
            assert_eq!(e.classify(), ScenarioStatus::Failed, "order {:?}", order);
        }
    }

    #[test]
    fn test_pending_counts_as_skipped() {
        let e = element(vec![step("passed", 1), step("pending", 1)]);
        assert_eq!(e.classify(), ScenarioStatus::Skipped);
    }

    #[test]
    fn test_steps_without_result_pass() {
        let e = element(vec![Step::default()]);
        assert_eq!(e.classify(), ScenarioStatus::Passed);
        assert_eq!(e.duration_nanos(), 0);
    }

    #[test]
    fn test_only_typed_scenarios_count() {
        let json = r#"[{"name":"F","elements":[
            {"name":"bg","type":"background","steps":[]},
            {"name":"untyped","steps":[{"result":{"status":"failed"}}]},
            {"name":"real","type":"scenario","steps":[{"result":{"status":"passed","duration":5}}]}
        ]}]"#;
        let features: Vec<Feature> = serde_json::from_str(json).unwrap();
        let outcomes = outcomes_from_features(&features);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "real");
        assert_eq!(outcomes[0].duration_nanos, 5);
    }

    #[test]
    fn test_features_from_outcomes_groups_by_feature() {
        let outcomes = vec![
            ScenarioOutcome::new("a", "Login", Vec::new(), ScenarioStatus::Passed, 1),
            ScenarioOutcome::new("b", "Search", Vec::new(), ScenarioStatus::Failed, 2),
            ScenarioOutcome::new("c", "Login", Vec::new(), ScenarioStatus::Skipped, 3),
        ];
        let features = features_from_outcomes(&outcomes);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].elements.len(), 2);

        let round = outcomes_from_features(&features);
        assert_eq!(round.iter().filter(|o| o.status == ScenarioStatus::Failed).count(), 1);
    }
}
