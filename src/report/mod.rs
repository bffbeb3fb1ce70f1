//! Report aggregation: collect (or synthesize) a normalized report, render
//! it and fan it out to the notification dispatchers.

pub mod checker;
pub mod cleanup;
pub mod collector;
pub mod cucumber;
pub mod fallback;
pub mod html;
pub mod json;
pub mod metadata;
pub mod types;

use chrono::{DateTime, Utc};
use colored::Colorize;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::notify::{self, DispatchOutcome, HttpTransport};
use crate::utils::{Config, EnvSnapshot};
use collector::ScenarioResultCollector;
use fallback::FallbackReportSynthesizer;
use html::{RenderOutcome, ReportRenderer};
use metadata::MetadataSources;
use types::NormalizedReport;

const REPORT_CANDIDATES: [&str; 4] = [
    "cucumber_report_dev.json",
    "cucumber_report_test.json",
    "cucumber_report_prod.json",
    "cucumber_report.json",
];

/// First existing runner report in `reports_dir`; the generic name when
/// none exists
pub fn find_cucumber_report(reports_dir: &Path) -> PathBuf {
    REPORT_CANDIDATES
        .iter()
        .map(|name| reports_dir.join(name))
        .find(|path| path.exists())
        .unwrap_or_else(|| reports_dir.join("cucumber_report.json"))
}

/// JSON files directly inside `reports_dir`, sorted by name
pub fn list_report_files(reports_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(reports_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse the primary report, synthesizing a fallback report if it is
/// unusable. Always yields a report.
pub fn load_report(
    path: &Path,
    config: &Config,
    sources: &MetadataSources,
    now: DateTime<Utc>,
) -> NormalizedReport {
    match ScenarioResultCollector::new(sources).collect(path, now) {
        Ok(report) => report,
        Err(e) => {
            warn!("Primary report unusable ({}); generating fallback report", e);
            FallbackReportSynthesizer::new(&config.paths, sources).synthesize(now)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Overrides report discovery
    pub report_path: Option<PathBuf>,
    pub notify: bool,
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub report: NormalizedReport,
    /// `None` when both render paths failed
    pub rendered: Option<RenderOutcome>,
    pub dispatches: Vec<(&'static str, DispatchOutcome)>,
}

impl PipelineSummary {
    pub fn print(&self) {
        let stats = &self.report.stats;
        println!();
        println!("{}", "═".repeat(50).dimmed());
        println!("{}", "📊 Report Summary".bold());
        println!(
            "  {} passed, {} failed, {} skipped ({} total, {:.1}% success)",
            stats.passed().to_string().green(),
            stats.failed().to_string().red(),
            stats.skipped().to_string().yellow(),
            stats.total_scenarios(),
            stats.pass_rate()
        );
        println!("  Duration: {}", self.report.metadata.formatted_duration());
        if self.report.is_fallback {
            println!(
                "  {} Fallback report: primary test data was missing, empty or malformed",
                "⚠".yellow()
            );
        }
        match &self.rendered {
            Some(outcome) => println!("  Report: {}", outcome.path().display()),
            None => println!("  {} HTML report could not be generated", "✗".red()),
        }
        for (name, outcome) in &self.dispatches {
            outcome.print(name);
        }
        println!("{}", "═".repeat(50).dimmed());
    }
}

/// Collect, render, save the normalized sidecar and notify
pub async fn run_pipeline(
    config: &Config,
    env: &EnvSnapshot,
    options: &PipelineOptions,
    transport: Arc<dyn HttpTransport>,
) -> PipelineSummary {
    let sources = MetadataSources::gather(config, env);
    let path = options
        .report_path
        .clone()
        .unwrap_or_else(|| find_cucumber_report(&config.paths.reports_dir));
    info!("Processing report: {}", path.display());

    let report = load_report(&path, config, &sources, Utc::now());
    let rendered = render(config, &report);

    if let Err(e) = json::write_normalized(&report, &config.paths.reports_dir) {
        warn!("Could not save normalized report: {:#}", e);
    }

    let dispatches = if options.notify {
        let dispatchers = notify::configured_dispatchers(config, transport);
        notify::dispatch_all(&dispatchers, &report).await
    } else {
        Vec::new()
    };

    PipelineSummary {
        report,
        rendered,
        dispatches,
    }
}

fn render(config: &Config, report: &NormalizedReport) -> Option<RenderOutcome> {
    let result = ReportRenderer::new(&config.paths).and_then(|r| r.render(report));
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!("HTML report generation failed: {}", e);
            // Leave something viewable; the run still counts as a render failure
            if let Err(e) = html::write_minimal_page(&config.paths, report) {
                error!("Emergency report failed too: {}", e);
            }
            None
        }
    }
}
