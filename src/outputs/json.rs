//! JSON run reports.
//!
//! Reports are grouped by the local date of the run:
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     └── 143000-run.json
//! ```

use crate::models::RunSummary;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    started_at: String,
    finished_at: String,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// `{report_dir}/{YYYY-MM-DD}/{HHMMSS}-run.json` for a run started at `started`.
pub fn report_path(report_dir: &Path, started: &DateTime<Local>) -> PathBuf {
    report_dir
        .join(started.format("%Y-%m-%d").to_string())
        .join(format!("{}-run.json", started.format("%H%M%S")))
}

/// Write `summary` as a JSON report and return the file path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir.display()))]
pub async fn write_run_report(
    summary: &RunSummary,
    report_dir: &Path,
    started: DateTime<Local>,
) -> Result<PathBuf, Box<dyn Error>> {
    let report = RunReport {
        started_at: started.to_rfc3339(),
        finished_at: Local::now().to_rfc3339(),
        succeeded: summary.succeeded(),
        failed: summary.failed(),
        skipped: summary.skipped(),
        summary,
    };
    let json = serde_json::to_string_pretty(&report)?;

    let path = report_path(report_dir, &started);
    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring report directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create report dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobOutcome, JobRecord};
    use chrono::TimeZone;

    #[test]
    fn test_report_path_layout() {
        let started = Local.with_ymd_and_hms(2025, 5, 6, 14, 30, 5).unwrap();
        let path = report_path(Path::new("/tmp/reports"), &started);
        assert_eq!(path, PathBuf::from("/tmp/reports/2025-05-06/143005-run.json"));
    }

    #[tokio::test]
    async fn test_write_run_report() {
        let dir = std::env::temp_dir().join(format!("blog_enhancer_report_{}", std::process::id()));
        let summary = RunSummary {
            jobs: vec![JobRecord {
                article_id: 1,
                title: "First".into(),
                outcome: JobOutcome::Failed {
                    reason: "rewrite failed".into(),
                },
            }],
        };

        let path = write_run_report(&summary, &dir, Local::now()).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["failed"], 1);
        assert_eq!(written["jobs"][0]["status"], "failed");
        assert_eq!(written["jobs"][0]["reason"], "rewrite failed");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
