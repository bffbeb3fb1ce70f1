use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::NormalizedReport;

pub const NORMALIZED_REPORT_FILE: &str = "normalized-report.json";

/// Save the normalized report next to the raw reports for the next
/// pipeline stage
pub fn write_normalized(report: &NormalizedReport, reports_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(reports_dir)?;
    let path = reports_dir.join(NORMALIZED_REPORT_FILE);
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Normalized report saved to: {}", path.display());
    Ok(path)
}
