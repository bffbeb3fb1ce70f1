//! Parses the BDD runner's JSON report into a [`NormalizedReport`].

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::cucumber::{outcomes_from_features, Feature};
use super::metadata::MetadataSources;
use super::types::NormalizedReport;

/// Why a primary report could not be used. Every variant means "synthesize
/// a fallback report instead".
#[derive(Error, Debug)]
pub enum ReportInputError {
    #[error("report file not found: {0}")]
    Missing(PathBuf),

    #[error("report file is empty: {0}")]
    Empty(PathBuf),

    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("report is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("report is not a JSON array of features")]
    NotAnArray,

    #[error("report contains no features")]
    NoFeatures,
}

pub struct ScenarioResultCollector<'a> {
    sources: &'a MetadataSources,
}

impl<'a> ScenarioResultCollector<'a> {
    pub fn new(sources: &'a MetadataSources) -> Self {
        Self { sources }
    }

    pub fn collect(
        &self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<NormalizedReport, ReportInputError> {
        let features = read_features(path)?;
        let scenarios = outcomes_from_features(&features);

        let summed_nanos = scenarios
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.duration_nanos));
        let metadata = self.sources.resolve(summed_nanos / 1_000_000, now);

        let report = NormalizedReport::new(
            scenarios,
            metadata,
            false,
            Some(path.to_path_buf()),
        );
        info!(
            "Parsed {}: {} scenarios ({} passed, {} failed, {} skipped)",
            path.display(),
            report.stats.total_scenarios(),
            report.stats.passed(),
            report.stats.failed(),
            report.stats.skipped()
        );
        Ok(report)
    }
}

/// Validate and parse the report file
pub fn read_features(path: &Path) -> Result<Vec<Feature>, ReportInputError> {
    if !path.exists() {
        return Err(ReportInputError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Err(ReportInputError::Empty(path.to_path_buf()));
    }

    let value: Value = serde_json::from_str(&content)?;
    let features = match value {
        Value::Array(items) if items.is_empty() => return Err(ReportInputError::NoFeatures),
        Value::Array(items) => items,
        _ => return Err(ReportInputError::NotAnArray),
    };
    debug!("Report {} has {} features", path.display(), features.len());

    features
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Feature>, _>>()
        .map_err(ReportInputError::from)
}
