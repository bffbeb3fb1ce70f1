//! HTML report rendering.
//!
//! The primary path renders the runner-format features through a handlebars
//! template inside a private scratch directory under the reports dir. If that
//! fails for a fallback report, a minimal static page is written instead.

use chrono::{DateTime, Local, Utc};
use handlebars::Handlebars;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::cucumber::{features_from_outcomes, Feature};
use super::types::{format_duration, ExecutionStats, NormalizedReport};
use crate::utils::config::ReportPaths;

pub const REPORT_TITLE: &str = "PAW Automation Test Execution Report";
pub const PAGE_TITLE: &str = "PAW BDD Test Results";
const SCRATCH_PREFIX: &str = "temp_report_generation";
const SCRATCH_REPORT: &str = "cucumber_report.json";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to register report template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    #[error("failed to render report: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("failed to serialize report data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which path produced the artifact
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Primary(PathBuf),
    Minimal(PathBuf),
}

impl RenderOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RenderOutcome::Primary(p) | RenderOutcome::Minimal(p) => p,
        }
    }
}

#[derive(Serialize)]
struct ReportView {
    title: String,
    page_title: &'static str,
    generated_at: String,
    is_fallback: bool,
    stats: ExecutionStats,
    custom_data_title: &'static str,
    custom_data: Vec<DataRow>,
    metadata: PlatformView,
    features: Vec<FeatureView>,
}

#[derive(Serialize)]
struct DataRow {
    label: &'static str,
    value: String,
}

#[derive(Serialize)]
struct PlatformView {
    browser_name: String,
    browser_version: &'static str,
    device: &'static str,
    platform: String,
}

#[derive(Serialize)]
struct FeatureView {
    name: String,
    scenarios: Vec<ScenarioView>,
}

#[derive(Serialize)]
struct ScenarioView {
    name: String,
    status: &'static str,
    duration: String,
    tags: Vec<String>,
    steps: Vec<StepView>,
}

#[derive(Serialize)]
struct StepView {
    keyword: String,
    name: String,
    status: String,
    error: String,
}

pub struct ReportRenderer<'a> {
    paths: &'a ReportPaths,
    templates: Handlebars<'static>,
}

impl<'a> ReportRenderer<'a> {
    pub fn new(paths: &'a ReportPaths) -> Result<Self, RenderError> {
        Self::with_template(paths, include_str!("../../templates/report.hbs"))
    }

    pub fn with_template(paths: &'a ReportPaths, template: &str) -> Result<Self, RenderError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates
            .register_template_string("report", template)
            .map_err(Box::new)?;
        Ok(Self { paths, templates })
    }

    /// Write `<reports_dir>/html-report/index.html`, replacing any previous
    /// report tree.
    pub fn render(&self, report: &NormalizedReport) -> Result<RenderOutcome, RenderError> {
        std::fs::create_dir_all(&self.paths.reports_dir)?;

        match self.render_primary(report) {
            Ok(path) => {
                info!("HTML report generated: {}", path.display());
                Ok(RenderOutcome::Primary(path))
            }
            Err(e) if report.is_fallback => {
                warn!("Primary renderer failed ({}); writing basic report", e);
                let path = write_minimal_page(self.paths, report)?;
                Ok(RenderOutcome::Minimal(path))
            }
            Err(e) => {
                error!("Failed to generate HTML report: {}", e);
                Err(e)
            }
        }
    }

    fn render_primary(&self, report: &NormalizedReport) -> Result<PathBuf, RenderError> {
        // Removed on drop, including on early return
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.paths.reports_dir)?;
        let scratch_json = scratch.path().join(SCRATCH_REPORT);

        match report.source.as_deref().filter(|_| !report.is_fallback) {
            Some(source) => {
                std::fs::copy(source, &scratch_json)?;
            }
            None => {
                let features = features_from_outcomes(&report.scenarios);
                std::fs::write(&scratch_json, serde_json::to_string_pretty(&features)?)?;
            }
        }
        debug!("Report input staged at {}", scratch_json.display());

        let features: Vec<Feature> =
            serde_json::from_str(&std::fs::read_to_string(&scratch_json)?)?;
        let view = build_view(report, &features, Utc::now());
        let html = self.templates.render("report", &view)?;

        let staged_dir = scratch.path().join(ReportPaths::HTML_REPORT_DIR);
        std::fs::create_dir_all(&staged_dir)?;
        std::fs::write(staged_dir.join("index.html"), html)?;

        let output_dir = self.paths.html_report_dir();
        if output_dir.exists() {
            std::fs::remove_dir_all(&output_dir)?;
        }
        std::fs::rename(&staged_dir, &output_dir)?;

        Ok(self.paths.html_index())
    }
}

fn build_view(report: &NormalizedReport, features: &[Feature], now: DateTime<Utc>) -> ReportView {
    let title = if report.is_fallback {
        format!("{} (Fallback)", REPORT_TITLE)
    } else {
        REPORT_TITLE.to_string()
    };

    let features = features
        .iter()
        .map(|feature| FeatureView {
            name: feature.name.clone(),
            scenarios: feature
                .elements
                .iter()
                .filter(|e| e.is_scenario())
                .map(|element| ScenarioView {
                    name: element.name.clone(),
                    status: element.classify().step_status(),
                    duration: format_duration(element.duration_nanos() / 1_000_000),
                    tags: element.tags.iter().map(|t| t.name.clone()).collect(),
                    steps: element
                        .steps
                        .iter()
                        .map(|step| {
                            let result = step.result.as_ref();
                            StepView {
                                keyword: step.keyword.clone(),
                                name: step.name.clone(),
                                status: result
                                    .map(|r| r.status.clone())
                                    .unwrap_or_else(|| "undefined".to_string()),
                                error: result
                                    .and_then(|r| r.error_message.clone())
                                    .unwrap_or_default(),
                            }
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    ReportView {
        title,
        page_title: PAGE_TITLE,
        generated_at: now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        is_fallback: report.is_fallback,
        stats: report.stats,
        custom_data_title: "Test Execution Summary",
        custom_data: summary_rows(report),
        metadata: PlatformView {
            browser_name: report.metadata.browser.clone(),
            browser_version: "latest",
            device: "Local Test Machine",
            platform: std::env::consts::OS.to_string(),
        },
        features,
    }
}

fn summary_rows(report: &NormalizedReport) -> Vec<DataRow> {
    let meta = &report.metadata;
    vec![
        DataRow {
            label: "Project",
            value: "Playwright BDD Framework".to_string(),
        },
        DataRow {
            label: "Environment",
            value: meta.environment.to_uppercase(),
        },
        DataRow {
            label: "Browser",
            value: meta.browser.clone(),
        },
        DataRow {
            label: "Execution Start Time",
            value: display_time(meta.start_time),
        },
        DataRow {
            label: "Execution End Time",
            value: display_time(meta.end_time),
        },
        DataRow {
            label: "Total Duration",
            value: meta.formatted_duration(),
        },
        DataRow {
            label: "Report Type",
            value: report.report_type().to_string(),
        },
    ]
}

fn display_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Write the static basic page to the conventional output path, replacing
/// any previous report tree.
pub fn write_minimal_page(
    paths: &ReportPaths,
    report: &NormalizedReport,
) -> Result<PathBuf, RenderError> {
    let output_dir = paths.html_report_dir();
    if output_dir.exists() {
        std::fs::remove_dir_all(&output_dir)?;
    }
    std::fs::create_dir_all(&output_dir)?;

    let path = paths.html_index();
    std::fs::write(&path, minimal_page(report, Utc::now()))?;
    info!("Basic HTML report created: {}", path.display());
    Ok(path)
}

fn minimal_page(report: &NormalizedReport, now: DateTime<Utc>) -> String {
    let meta = &report.metadata;
    let stats = &report.stats;
    let banner = if report.is_fallback {
        r#"<div class="alert alert-warning">
            <strong>Fallback Report</strong><br>
            This is a basic report generated because the primary test report was missing or invalid.
            Test execution may have failed before generating proper results.
        </div>"#
    } else {
        r#"<div class="alert alert-warning">
            <strong>Basic Report</strong><br>
            The full HTML report could not be generated.
        </div>"#
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{page_title} - Basic Report</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }}
        .container {{ max-width: 800px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; }}
        .header {{ text-align: center; margin-bottom: 30px; }}
        .status-failed {{ color: #dc3545; }}
        .status-passed {{ color: #28a745; }}
        .status-unknown {{ color: #ffc107; }}
        .info-table {{ width: 100%; border-collapse: collapse; margin: 20px 0; }}
        .info-table th, .info-table td {{ padding: 10px; text-align: left; border-bottom: 1px solid #ddd; }}
        .alert-warning {{ padding: 15px; background-color: #fff3cd; border: 1px solid #ffeaa7; color: #856404; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{title}</h1>
            <h2>Basic {report_type}</h2>
        </div>
        {banner}
        <table class="info-table">
            <tr><th>Property</th><th>Value</th></tr>
            <tr><td>Environment</td><td>{environment}</td></tr>
            <tr><td>Browser</td><td>{browser}</td></tr>
            <tr><td>Start Time</td><td>{start}</td></tr>
            <tr><td>End Time</td><td>{end}</td></tr>
            <tr><td>Duration</td><td>{duration}</td></tr>
            <tr><td>Total Scenarios</td><td>{total}</td></tr>
            <tr><td>Passed</td><td class="status-passed">{passed}</td></tr>
            <tr><td>Failed</td><td class="status-failed">{failed}</td></tr>
            <tr><td>Skipped</td><td class="status-unknown">{skipped}</td></tr>
        </table>
        <div style="margin-top: 30px; text-align: center; color: #666;">
            <p>Generated by PAW Automation Framework</p>
            <p>Report generated at: {generated}</p>
        </div>
    </div>
</body>
</html>
"#,
        page_title = PAGE_TITLE,
        title = REPORT_TITLE,
        report_type = report.report_type(),
        banner = banner,
        environment = html_escape(&meta.environment.to_uppercase()),
        browser = html_escape(&meta.browser),
        start = display_time(meta.start_time),
        end = display_time(meta.end_time),
        duration = meta.formatted_duration(),
        total = stats.total_scenarios(),
        passed = stats.passed(),
        failed = stats.failed(),
        skipped = stats.skipped(),
        generated = display_time(Some(now)),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::types::{ExecutionMetadata, ScenarioOutcome, ScenarioStatus};

    fn report(names: &[&str], is_fallback: bool) -> NormalizedReport {
        let scenarios = names
            .iter()
            .map(|n| ScenarioOutcome::new(*n, "Checkout", Vec::new(), ScenarioStatus::Passed, 0))
            .collect();
        let meta = ExecutionMetadata::new(None, None, 90_000, "chrome", "dev");
        NormalizedReport::new(scenarios, meta, is_fallback, None)
    }

    fn read_index(paths: &ReportPaths) -> String {
        std::fs::read_to_string(paths.html_index()).unwrap()
    }

    fn scratch_dirs_left(paths: &ReportPaths) -> usize {
        std::fs::read_dir(&paths.reports_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX))
            .count()
    }

    #[test]
    fn test_renders_scenarios_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        let renderer = ReportRenderer::new(&paths).unwrap();

        let outcome = renderer.render(&report(&["Pays by card"], false)).unwrap();
        assert_eq!(outcome, RenderOutcome::Primary(paths.html_index()));

        let html = read_index(&paths);
        assert!(html.contains("Pays by card"));
        assert!(html.contains("1m 30s"));
        assert!(html.contains("Standard Report"));
        assert!(html.contains("DEV"));
        assert_eq!(scratch_dirs_left(&paths), 0);
    }

    #[test]
    fn test_rerender_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        let renderer = ReportRenderer::new(&paths).unwrap();

        renderer.render(&report(&["First run scenario"], false)).unwrap();
        std::fs::write(paths.html_report_dir().join("stale.css"), "x").unwrap();
        renderer.render(&report(&["Second run scenario"], false)).unwrap();

        let html = read_index(&paths);
        assert!(html.contains("Second run scenario"));
        assert!(!html.contains("First run scenario"));
        assert!(!paths.html_report_dir().join("stale.css").exists());
    }

    #[test]
    fn test_fallback_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        let renderer = ReportRenderer::new(&paths).unwrap();

        renderer.render(&report(&["Test Execution - Status: FAILED"], true)).unwrap();
        let html = read_index(&paths);
        assert!(html.contains("(Fallback)"));
        assert!(html.contains("Fallback Report"));
    }

    #[test]
    fn test_broken_renderer_falls_back_to_minimal_page() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        let renderer = ReportRenderer::with_template(&paths, "{{missing.field}}").unwrap();

        let outcome = renderer.render(&report(&["x"], true)).unwrap();
        assert!(matches!(outcome, RenderOutcome::Minimal(_)));
        let html = read_index(&paths);
        assert!(html.contains("Basic Fallback Report"));
        assert!(html.contains("<td>Total Scenarios</td><td>1</td>"));
        assert_eq!(scratch_dirs_left(&paths), 0);
    }

    #[test]
    fn test_broken_renderer_fails_for_standard_report() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::rooted_at(dir.path());
        let renderer = ReportRenderer::with_template(&paths, "{{missing.field}}").unwrap();

        assert!(renderer.render(&report(&["x"], false)).is_err());
        assert!(!paths.html_index().exists());
    }
}
