//! Synthesizes a one-scenario report from the pipeline's plain-text status
//! signals when the primary report cannot be used. Never fails.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::path::Path;

use super::metadata::{start_before, MetadataSources};
use super::types::{ExecutionMetadata, NormalizedReport, ScenarioOutcome, ScenarioStatus};
use crate::utils::config::ReportPaths;

pub const FALLBACK_FEATURE: &str = "Test Execution Report";

/// Overall status token as written by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusToken {
    Passed,
    Failed,
    Unknown,
}

impl StatusToken {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PASSED" => StatusToken::Passed,
            "FAILED" => StatusToken::Failed,
            _ => StatusToken::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusToken::Passed => "PASSED",
            StatusToken::Failed => "FAILED",
            StatusToken::Unknown => "UNKNOWN",
        }
    }

    pub fn scenario_status(&self) -> ScenarioStatus {
        match self {
            StatusToken::Passed => ScenarioStatus::Passed,
            StatusToken::Failed => ScenarioStatus::Failed,
            StatusToken::Unknown => ScenarioStatus::Skipped,
        }
    }
}

pub struct FallbackReportSynthesizer<'a> {
    paths: &'a ReportPaths,
    sources: &'a MetadataSources,
}

impl<'a> FallbackReportSynthesizer<'a> {
    pub fn new(paths: &'a ReportPaths, sources: &'a MetadataSources) -> Self {
        Self { paths, sources }
    }

    pub fn synthesize(&self, now: DateTime<Utc>) -> NormalizedReport {
        let status = read_signal(&self.paths.status_file())
            .map(|s| StatusToken::parse(&s))
            .unwrap_or(StatusToken::Unknown);
        let elapsed_secs = read_signal(&self.paths.elapsed_file())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let scenario = ScenarioOutcome::new(
            format!("Test Execution - Status: {}", status.as_str()),
            FALLBACK_FEATURE,
            Vec::new(),
            status.scenario_status(),
            elapsed_secs.saturating_mul(1_000_000_000),
        );

        let duration_ms = elapsed_secs.saturating_mul(1000);
        let (browser, environment) = self.sources.browser_and_environment();
        let sidecar = self.sources.sidecar.as_ref();
        let metadata = match sidecar.and_then(|m| m.start_time.zip(m.end_time)) {
            Some((start, end)) if end >= start => {
                ExecutionMetadata::new(Some(start), Some(end), duration_ms, browser, environment)
            }
            _ => {
                let start = start_before(now, duration_ms);
                ExecutionMetadata::new(start, Some(now), duration_ms, browser, environment)
            }
        };

        info!(
            "Fallback report: status {}, duration {}s",
            status.as_str(),
            elapsed_secs
        );
        NormalizedReport::new(vec![scenario], metadata, true, None)
    }
}

fn read_signal(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_with(status: Option<&str>, elapsed: Option<&str>) -> (tempfile::TempDir, ReportPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        std::fs::create_dir_all(&paths.pipeline_results_dir).unwrap();
        if let Some(s) = status {
            std::fs::write(paths.status_file(), s).unwrap();
        }
        if let Some(e) = elapsed {
            std::fs::write(paths.elapsed_file(), e).unwrap();
        }
        (dir, paths)
    }

    #[test]
    fn test_passed_with_elapsed() {
        let (_dir, paths) = paths_with(Some("PASSED\n"), Some("125"));
        let sources = MetadataSources::default();
        let report = FallbackReportSynthesizer::new(&paths, &sources).synthesize(Utc::now());

        assert!(report.is_fallback);
        assert_eq!(report.scenarios.len(), 1);
        assert_eq!(report.scenarios[0].status, ScenarioStatus::Passed);
        assert_eq!(report.scenarios[0].duration_nanos, 125_000_000_000);
        assert_eq!(report.metadata.total_duration_ms, 125_000);
        assert_eq!(report.stats.passed(), 1);
    }

    #[test]
    fn test_missing_signals_default_to_unknown_and_zero() {
        let (_dir, paths) = paths_with(None, None);
        let sources = MetadataSources::default();
        let report = FallbackReportSynthesizer::new(&paths, &sources).synthesize(Utc::now());

        assert_eq!(report.scenarios[0].status, ScenarioStatus::Skipped);
        assert_eq!(report.scenarios[0].name, "Test Execution - Status: UNKNOWN");
        assert_eq!(report.metadata.total_duration_ms, 0);
        assert_eq!(report.metadata.start_time, report.metadata.end_time);
    }

    #[test]
    fn test_garbage_signals_degrade() {
        let (_dir, paths) = paths_with(Some("ABORTED"), Some("soon"));
        let sources = MetadataSources::default();
        let report = FallbackReportSynthesizer::new(&paths, &sources).synthesize(Utc::now());

        assert_eq!(report.scenarios[0].status, ScenarioStatus::Skipped);
        assert_eq!(report.scenarios[0].duration_nanos, 0);
    }

    #[test]
    fn test_huge_elapsed_value_does_not_panic() {
        let (_dir, paths) = paths_with(Some("FAILED"), Some("9000000000000000"));
        let sources = MetadataSources::default();
        let now = Utc::now();
        let report = FallbackReportSynthesizer::new(&paths, &sources).synthesize(now);

        assert!(report.is_fallback);
        assert_eq!(report.scenarios[0].status, ScenarioStatus::Failed);
        assert_eq!(report.scenarios[0].duration_nanos, u64::MAX);
        assert_eq!(report.metadata.total_duration_ms, 9_000_000_000_000_000_000);
        assert_eq!(report.metadata.start_time, None);
        assert_eq!(report.metadata.end_time, Some(now));
        assert!(!report.metadata.formatted_duration().is_empty());
    }

    #[test]
    fn test_failed_token_is_case_insensitive() {
        assert_eq!(StatusToken::parse(" failed "), StatusToken::Failed);
    }
}
