use anyhow::Result;
use log::{info, warn};
use std::path::Path;

/// Remove stale top-level `*.json` and `*.html` files so a new run never
/// picks up a previous run's report. Directories are left alone.
pub fn cleanup_reports(reports_dir: &Path) -> Result<usize> {
    if !reports_dir.exists() {
        info!("Reports directory does not exist, nothing to clean");
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(reports_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let stale = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("html")
        );
        if !stale {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    info!("Cleanup complete: {} files removed", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_reports_keeps_html_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("cucumber_report.json"), "[]").unwrap();
        std::fs::write(root.join("old.html"), "").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();
        std::fs::create_dir_all(root.join("html-report")).unwrap();
        std::fs::write(root.join("html-report/index.html"), "").unwrap();

        assert_eq!(cleanup_reports(root).unwrap(), 2);
        assert!(root.join("notes.txt").exists());
        assert!(root.join("html-report/index.html").exists());
    }

    #[test]
    fn test_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_reports(&dir.path().join("none")).unwrap(), 0);
    }
}
