use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use log::warn;
use std::path::{Path, PathBuf};

use super::context::ScenarioContext;
use crate::driver::PageActions;
use crate::report::metadata::{ExecutionMetadataFile, SidecarMetadata};
use crate::report::types::ScenarioStatus;
use crate::utils::Config;

pub const SCREENSHOT_DIR: &str = "test-results";

/// Run-level hooks around the BDD runner: metadata sidecar, stale
/// screenshots and failure captures
pub struct RunLifecycle {
    metadata: ExecutionMetadataFile,
    screenshot_dir: PathBuf,
    browser: String,
    environment: String,
    executed: u32,
}

impl RunLifecycle {
    pub fn new(config: &Config) -> Self {
        Self::with_screenshot_dir(config, PathBuf::from(SCREENSHOT_DIR))
    }

    pub fn with_screenshot_dir(config: &Config, screenshot_dir: PathBuf) -> Self {
        Self {
            metadata: ExecutionMetadataFile::new(config.paths.metadata_file()),
            screenshot_dir,
            browser: config.browser.clone(),
            environment: config.environment.clone(),
            executed: 0,
        }
    }

    pub fn executed(&self) -> u32 {
        self.executed
    }

    pub fn before_all(&mut self, now: DateTime<Utc>) -> Result<SidecarMetadata> {
        println!(
            "{} Test execution started at: {}",
            "▶".green(),
            now.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
        let removed = clear_screenshots(&self.screenshot_dir);
        if removed > 0 {
            println!("  Cleared {} old screenshots", removed);
        }
        self.executed = 0;
        self.metadata.record_start(now, &self.browser, &self.environment)
    }

    pub fn before_scenario(&mut self, name: &str) -> ScenarioContext {
        self.executed += 1;
        println!("\n{} Starting scenario: {}", "▶".cyan(), name.bold());
        ScenarioContext::new(name)
    }

    /// Log the outcome and, for failures, capture the page. Consumes the
    /// context so no scenario state outlives the scenario.
    pub async fn after_scenario(
        &self,
        ctx: ScenarioContext,
        status: ScenarioStatus,
        page: Option<&dyn PageActions>,
    ) -> Option<PathBuf> {
        println!(
            "{} Scenario completed: {} - {} ({}ms)",
            if status == ScenarioStatus::Failed {
                "✗".red()
            } else {
                "✓".green()
            },
            ctx.name,
            status,
            ctx.elapsed_ms()
        );
        if status != ScenarioStatus::Failed {
            return None;
        }
        let page = page?;
        let path = self
            .screenshot_dir
            .join("screenshots")
            .join(screenshot_name(&ctx.name, Utc::now()));
        match page.screenshot(&path).await {
            Ok(()) => {
                println!("  Screenshot captured: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not take screenshot: {:#}", e);
                None
            }
        }
    }

    pub fn after_all(&self, now: DateTime<Utc>) -> Result<SidecarMetadata> {
        let meta = self.metadata.record_finish(now, self.executed)?;
        println!(
            "{} Test execution completed; total execution time: {:.2}s",
            "■".green(),
            meta.total_duration.unwrap_or(0) as f64 / 1000.0
        );
        Ok(meta)
    }
}

/// `<name with non-alphanumerics as _>_<timestamp>.png`
pub fn screenshot_name(scenario: &str, now: DateTime<Utc>) -> String {
    let safe: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.png", safe, now.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// Remove top-level `.png`/`.jpg` files; a missing directory is fine
fn clear_screenshots(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e == "png" || e == "jpg")
                    .unwrap_or(false)
        })
        .filter(|path| match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not clear screenshot {}: {}", path.display(), e);
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::FakePage;
    use chrono::TimeZone;

    fn lifecycle(root: &Path) -> RunLifecycle {
        let mut config = Config::default();
        config.paths.reports_dir = root.join("reports");
        config.browser = "firefox".into();
        config.environment = "test".into();
        RunLifecycle::with_screenshot_dir(&config, root.join("test-results"))
    }

    #[test]
    fn test_lifecycle_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = lifecycle(dir.path());
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        let started = run.before_all(start).unwrap();
        assert_eq!(started.browser.as_deref(), Some("firefox"));
        assert_eq!(started.environment.as_deref(), Some("test"));

        let first = run.before_scenario("one");
        drop(first);
        let _second = run.before_scenario("two");
        assert_eq!(run.executed(), 2);

        let finished = run.after_all(start + chrono::Duration::seconds(90)).unwrap();
        assert_eq!(finished.total_duration, Some(90_000));
        assert_eq!(finished.total_scenarios, Some(2));
        assert!(finished.complete_timing().is_some());
    }

    #[test]
    fn test_before_all_clears_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let shots = dir.path().join("test-results");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("old.png"), b"x").unwrap();
        std::fs::write(shots.join("old.jpg"), b"x").unwrap();
        std::fs::write(shots.join("notes.txt"), b"x").unwrap();

        let mut run = lifecycle(dir.path());
        run.before_all(Utc::now()).unwrap();
        assert!(!shots.join("old.png").exists());
        assert!(!shots.join("old.jpg").exists());
        assert!(shots.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_screenshot_only_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = lifecycle(dir.path());
        let page = FakePage::default();

        let ctx = run.before_scenario("passes");
        assert!(run
            .after_scenario(ctx, ScenarioStatus::Passed, Some(&page))
            .await
            .is_none());

        let ctx = run.before_scenario("Login: bad password");
        let path = run
            .after_scenario(ctx, ScenarioStatus::Failed, Some(&page))
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Login__bad_password_"));
        assert_eq!(page.actions().len(), 1);
    }

    #[test]
    fn test_screenshot_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            screenshot_name("a b/c", at),
            "a_b_c_2024-03-01T10-00-00-000Z.png"
        );
    }
}
