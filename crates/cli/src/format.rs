//! Report formatting for one-shot modes.
//!
//! - **Human** (default): one line per file
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use logship_durability::{LogFileId, UploadState};
use logship_shipper::CycleReport;
use serde::Serialize;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

/// Format an upload cycle report.
pub fn format_report(report: &CycleReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_json(report),
        OutputMode::Human => {
            let mut out = format!(
                "scanned {} file(s), attempted {}, uploaded {} ({} already present), failed {}, reclaimed {}",
                report.scanned,
                report.attempted,
                report.uploaded.len(),
                report.already_present,
                report.failed.len(),
                report.reclaimed.len()
            );
            for id in &report.uploaded {
                out.push_str(&format!("\n  uploaded  {}", id));
            }
            for failure in &report.failed {
                out.push_str(&format!(
                    "\n  failed    {} (attempt {}): {}",
                    failure.file, failure.attempt, failure.error
                ));
            }
            out
        }
    }
}

#[derive(Serialize)]
struct PendingEntry<'a> {
    file: LogFileId,
    status: &'a str,
    attempts: u32,
    last_error: Option<&'a str>,
}

/// Format the closed files a dry run found.
pub fn format_pending(files: &[(LogFileId, Option<UploadState>)], mode: OutputMode) -> String {
    let entries: Vec<PendingEntry<'_>> = files
        .iter()
        .map(|(id, state)| PendingEntry {
            file: *id,
            status: state.as_ref().map_or("new", |s| s.status().as_str()),
            attempts: state.as_ref().map_or(0, |s| s.attempt_count()),
            last_error: state.as_ref().and_then(|s| s.last_error()),
        })
        .collect();

    match mode {
        OutputMode::Json => to_json(&entries),
        OutputMode::Human if entries.is_empty() => "nothing to upload".to_string(),
        OutputMode::Human => {
            let mut out = format!("{} file(s) would be uploaded", entries.len());
            for entry in &entries {
                out.push_str(&format!(
                    "\n  {}  {:<9} attempts={}",
                    entry.file, entry.status, entry.attempts
                ));
                if let Some(err) = entry.last_error {
                    out.push_str(&format!("  last_error={}", err));
                }
            }
            out
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logship_shipper::FileFailure;

    #[test]
    fn test_human_report_lists_files() {
        let report = CycleReport {
            scanned: 2,
            attempted: 2,
            uploaded: vec![LogFileId::new(1_700_000_000_000, 1)],
            failed: vec![FileFailure {
                file: LogFileId::new(1_700_000_000_000, 2),
                attempt: 3,
                error: "network error: timed out".to_string(),
            }],
            ..CycleReport::default()
        };
        let text = format_report(&report, OutputMode::Human);
        assert!(text.starts_with("scanned 2 file(s), attempted 2, uploaded 1"));
        assert!(text.contains("attempt 3"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn test_pending_json() {
        let id = LogFileId::new(1_700_000_000_000, 4);
        let at = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let files = vec![(id, None), (id, Some(UploadState::pending(id, at)))];
        let json: serde_json::Value =
            serde_json::from_str(&format_pending(&files, OutputMode::Json)).unwrap();
        assert_eq!(json[0]["status"], "new");
        assert_eq!(json[1]["status"], "pending");
        assert_eq!(json[1]["attempts"], 0);
    }

    #[test]
    fn test_nothing_pending() {
        assert_eq!(format_pending(&[], OutputMode::Human), "nothing to upload");
    }
}
