use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a single scenario
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Passed => "PASSED",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Skipped => "SKIPPED",
        }
    }

    /// Lowercase form used by the BDD runner's report format
    pub fn step_status(&self) -> &'static str {
        match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified scenario. Built once while parsing and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub name: String,
    pub feature_name: String,
    /// Tag names in report order, duplicates removed
    pub tags: Vec<String>,
    pub status: ScenarioStatus,
    pub duration_nanos: u64,
}

impl ScenarioOutcome {
    pub fn new(
        name: impl Into<String>,
        feature_name: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
        status: ScenarioStatus,
        duration_nanos: u64,
    ) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            if !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        Self {
            name: name.into(),
            feature_name: feature_name.into(),
            tags: unique,
            status,
            duration_nanos,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_nanos / 1_000_000
    }
}

/// Aggregate counts. Only constructed from a scenario sequence, so
/// `total_scenarios == passed + failed + skipped` always holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    total_scenarios: u32,
    passed: u32,
    failed: u32,
    skipped: u32,
}

impl ExecutionStats {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ScenarioOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(Self::default(), |mut stats, outcome| {
                stats.total_scenarios += 1;
                match outcome.status {
                    ScenarioStatus::Passed => stats.passed += 1,
                    ScenarioStatus::Failed => stats.failed += 1,
                    ScenarioStatus::Skipped => stats.skipped += 1,
                }
                stats
            })
    }

    pub fn total_scenarios(&self) -> u32 {
        self.total_scenarios
    }

    pub fn passed(&self) -> u32 {
        self.passed
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// Pass rate in percent, 0.0 for an empty run
    pub fn pass_rate(&self) -> f64 {
        if self.total_scenarios == 0 {
            0.0
        } else {
            self.passed as f64 / self.total_scenarios as f64 * 100.0
        }
    }
}

/// Timing and environment information for one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
    pub browser: String,
    pub environment: String,
}

impl ExecutionMetadata {
    /// Build metadata, dropping the end time if it precedes the start time
    pub fn new(
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        total_duration_ms: u64,
        browser: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        let end_time = match (start_time, end_time) {
            (Some(start), Some(end)) if end < start => None,
            (_, end) => end,
        };
        Self {
            start_time,
            end_time,
            total_duration_ms,
            browser: browser.into(),
            environment: environment.into(),
        }
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.total_duration_ms)
    }
}

/// The unit handed to the renderer and every dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedReport {
    pub stats: ExecutionStats,
    pub scenarios: Vec<ScenarioOutcome>,
    pub metadata: ExecutionMetadata,
    pub is_fallback: bool,
    /// Primary JSON report this was parsed from; `None` when synthesized
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl NormalizedReport {
    pub fn new(
        scenarios: Vec<ScenarioOutcome>,
        metadata: ExecutionMetadata,
        is_fallback: bool,
        source: Option<PathBuf>,
    ) -> Self {
        Self {
            stats: ExecutionStats::from_outcomes(&scenarios),
            scenarios,
            metadata,
            is_fallback,
            source,
        }
    }

    pub fn failed_scenarios(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.scenarios
            .iter()
            .filter(|s| s.status == ScenarioStatus::Failed)
    }

    pub fn report_type(&self) -> &'static str {
        if self.is_fallback {
            "Fallback Report"
        } else {
            "Standard Report"
        }
    }
}

/// Format milliseconds as `1h 2m 3s`, omitting zero-valued leading units.
/// Seconds are always shown when every higher unit is zero.
pub fn format_duration(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", seconds));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn outcome(status: ScenarioStatus) -> ScenarioOutcome {
        ScenarioOutcome::new("s", "f", Vec::new(), status, 0)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(999), "0s");
        assert_eq!(format_duration(65_000), "1m 5s");
        assert_eq!(format_duration(90_000), "1m 30s");
        assert_eq!(format_duration(3_661_000), "1h 1m 1s");
        assert_eq!(format_duration(3_600_000), "1h");
        assert_eq!(format_duration(7_205_000), "2h 5s");
    }

    #[test]
    fn test_stats_always_sum_to_total() {
        let outcomes = vec![
            outcome(ScenarioStatus::Passed),
            outcome(ScenarioStatus::Failed),
            outcome(ScenarioStatus::Skipped),
            outcome(ScenarioStatus::Passed),
        ];
        let stats = ExecutionStats::from_outcomes(&outcomes);
        assert_eq!(stats.total_scenarios(), 4);
        assert_eq!(
            stats.passed() + stats.failed() + stats.skipped(),
            stats.total_scenarios()
        );
        assert_eq!(stats.pass_rate(), 50.0);
    }

    #[test]
    fn test_tags_are_deduplicated_in_order() {
        let s = ScenarioOutcome::new(
            "s",
            "f",
            vec!["@C1".to_string(), "@smoke".to_string(), "@C1".to_string()],
            ScenarioStatus::Passed,
            0,
        );
        assert_eq!(s.tags, vec!["@C1", "@smoke"]);
    }

    #[test]
    fn test_metadata_drops_end_before_start() {
        let start = Utc::now();
        let end = start - Duration::seconds(5);
        let meta = ExecutionMetadata::new(Some(start), Some(end), 0, "chrome", "dev");
        assert_eq!(meta.start_time, Some(start));
        assert!(meta.end_time.is_none());
    }
}
