//! Sidecar execution-metadata file written by the run lifecycle hooks.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::ExecutionMetadata;
use crate::utils::{Config, EnvSnapshot};

pub const FRAMEWORK_NAME: &str = "PAW Playwright BDD";
pub const FRAMEWORK_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_scenarios: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SidecarMetadata {
    /// Start, end and duration, when the file describes a complete run
    pub fn complete_timing(&self) -> Option<(DateTime<Utc>, DateTime<Utc>, u64)> {
        match (self.start_time, self.end_time, self.total_duration) {
            (Some(start), Some(end), Some(ms)) if ms > 0 && end >= start => Some((start, end, ms)),
            _ => None,
        }
    }
}

/// Handle on `<reports_dir>/execution-metadata.json`
#[derive(Debug, Clone)]
pub struct ExecutionMetadataFile {
    path: PathBuf,
}

impl ExecutionMetadataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the sidecar. Missing or malformed files yield `None`.
    pub fn load(&self) -> Option<SidecarMetadata> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => {
                debug!("No execution metadata at {}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(
                    "Could not read execution metadata {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn record_start(
        &self,
        now: DateTime<Utc>,
        browser: &str,
        environment: &str,
    ) -> Result<SidecarMetadata> {
        let meta = SidecarMetadata {
            start_time: Some(now),
            browser: Some(browser.to_string()),
            environment: Some(environment.to_string()),
            framework: Some(FRAMEWORK_NAME.to_string()),
            version: Some(FRAMEWORK_VERSION.to_string()),
            ..Default::default()
        };
        self.write(&meta)?;
        Ok(meta)
    }

    /// Add end time, duration and scenario count to the start record.
    /// Without a start record the duration is zero.
    pub fn record_finish(&self, now: DateTime<Utc>, total_scenarios: u32) -> Result<SidecarMetadata> {
        let mut meta = self.load().unwrap_or_default();
        let duration = meta
            .start_time
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        meta.end_time = Some(now);
        meta.total_duration = Some(duration);
        meta.total_scenarios = Some(total_scenarios);
        self.write(&meta)?;
        Ok(meta)
    }

    fn write(&self, meta: &SidecarMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(meta)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!("Execution metadata saved to {}", self.path.display());
        Ok(())
    }
}

/// Everything metadata resolution may draw on besides the report itself
#[derive(Debug, Clone, Default)]
pub struct MetadataSources {
    pub sidecar: Option<SidecarMetadata>,
    /// Explicit `BROWSER` selection
    pub browser_env: Option<String>,
    /// Explicit `ENV` selection
    pub environment_env: Option<String>,
}

impl MetadataSources {
    pub fn gather(config: &Config, env: &EnvSnapshot) -> Self {
        Self {
            sidecar: ExecutionMetadataFile::new(config.paths.metadata_file()).load(),
            browser_env: env.get("BROWSER").map(str::to_string),
            environment_env: env.get("ENV").map(str::to_string),
        }
    }

    /// Browser: explicit env, then sidecar, then `chrome`.
    /// Environment: sidecar, then explicit env, then `dev`.
    pub fn browser_and_environment(&self) -> (String, String) {
        let sidecar = self.sidecar.as_ref();
        let browser = self
            .browser_env
            .clone()
            .or_else(|| sidecar.and_then(|m| m.browser.clone()))
            .unwrap_or_else(|| "chrome".to_string());
        let environment = sidecar
            .and_then(|m| m.environment.clone())
            .or_else(|| self.environment_env.clone())
            .unwrap_or_else(|| "dev".to_string());
        (browser, environment)
    }

    /// Build metadata, using sidecar timing when it describes a complete run
    /// and otherwise ending a run of `derived_ms` at `now`.
    pub fn resolve(&self, derived_ms: u64, now: DateTime<Utc>) -> ExecutionMetadata {
        let (browser, environment) = self.browser_and_environment();
        match self.sidecar.as_ref().and_then(SidecarMetadata::complete_timing) {
            Some((start, end, ms)) => {
                debug!("Using sidecar timing: {}ms", ms);
                ExecutionMetadata::new(Some(start), Some(end), ms, browser, environment)
            }
            None => {
                let start = start_before(now, derived_ms);
                ExecutionMetadata::new(start, Some(now), derived_ms, browser, environment)
            }
        }
    }
}

/// `now` minus `ms`; `None` when the result falls outside chrono's range
pub fn start_before(now: DateTime<Utc>, ms: u64) -> Option<DateTime<Utc>> {
    let start = i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delta| now.checked_sub_signed(delta));
    if start.is_none() {
        warn!("Run duration of {}ms is out of range; start time unknown", ms);
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_start_then_finish() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExecutionMetadataFile::new(dir.path().join("reports/execution-metadata.json"));
        let start = Utc::now();

        file.record_start(start, "firefox", "test").unwrap();
        let finished = file
            .record_finish(start + Duration::milliseconds(4_500), 7)
            .unwrap();

        assert_eq!(finished.browser.as_deref(), Some("firefox"));
        assert_eq!(finished.total_duration, Some(4_500));
        assert_eq!(finished.total_scenarios, Some(7));
        assert_eq!(finished.framework.as_deref(), Some(FRAMEWORK_NAME));
        assert_eq!(file.load(), Some(finished.clone()));
        assert!(finished.complete_timing().is_some());
    }

    #[test]
    fn test_start_only_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExecutionMetadataFile::new(dir.path().join("execution-metadata.json"));
        let meta = file.record_start(Utc::now(), "chrome", "dev").unwrap();
        assert!(meta.complete_timing().is_none());
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("execution-metadata.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ExecutionMetadataFile::new(path).load().is_none());
    }

    #[test]
    fn test_reads_runner_written_file() {
        let json = r#"{
            "startTime": "2024-05-01T10:00:00.000Z",
            "endTime": "2024-05-01T10:02:30.000Z",
            "totalDuration": 150000,
            "browser": "chrome",
            "environment": "dev",
            "totalScenarios": 5
        }"#;
        let meta: SidecarMetadata = serde_json::from_str(json).unwrap();
        let (_, _, ms) = meta.complete_timing().unwrap();
        assert_eq!(ms, 150_000);
    }

    #[test]
    fn test_browser_env_beats_sidecar_environment_sidecar_beats_env() {
        let sources = MetadataSources {
            sidecar: Some(SidecarMetadata {
                browser: Some("firefox".into()),
                environment: Some("test".into()),
                ..Default::default()
            }),
            browser_env: Some("webkit".into()),
            environment_env: Some("prod".into()),
        };
        assert_eq!(
            sources.browser_and_environment(),
            ("webkit".to_string(), "test".to_string())
        );
        assert_eq!(
            MetadataSources::default().browser_and_environment(),
            ("chrome".to_string(), "dev".to_string())
        );
    }

    #[test]
    fn test_resolve_derives_start_from_now() {
        let now = Utc::now();
        let meta = MetadataSources::default().resolve(2_000, now);
        assert_eq!(meta.end_time, Some(now));
        assert_eq!(meta.start_time, Some(now - Duration::milliseconds(2_000)));
        assert_eq!(meta.total_duration_ms, 2_000);
    }

    #[test]
    fn test_resolve_out_of_range_duration_keeps_end() {
        let now = Utc::now();
        for ms in [9_000_000_000_000_000_000, u64::MAX] {
            let meta = MetadataSources::default().resolve(ms, now);
            assert_eq!(meta.start_time, None);
            assert_eq!(meta.end_time, Some(now));
            assert_eq!(meta.total_duration_ms, ms);
        }
    }

    #[test]
    fn test_start_before() {
        let now = Utc::now();
        assert_eq!(start_before(now, 0), Some(now));
        assert_eq!(start_before(now, 1_500), Some(now - Duration::milliseconds(1_500)));
        assert_eq!(start_before(now, i64::MAX as u64 + 1), None);
    }
}
