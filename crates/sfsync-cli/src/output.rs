//! Shared output layer: human text or JSON for every command.
//!
//! Results go to stdout; errors go to stderr as `error: ...` plus an optional
//! `suggestion: ...`, or as `{"error": {...}}` in JSON mode.

use serde::Serialize;
use sfsync_core::config::ConfigError;
use sfsync_core::labels::LabelError;
use sfsync_core::reconcile::{Decision, SyncReport};
use sfsync_core::{ErrorCode, SyncError};
use std::io::{self, Write};

/// Width of the key column in aligned summaries.
const KV_WIDTH: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl std::fmt::Display) -> io::Result<()> {
    writeln!(w, "  {:<KV_WIDTH$} {value}", format!("{key}:"))
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode the value is serialized with `serde_json`; otherwise
/// `human_fn` writes the text form.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A failure that carries its own machine code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let code = error_code_of(err);
        Self {
            message: format!("{err:#}"),
            suggestion: code.and_then(ErrorCode::hint).map(str::to_string),
            error_code: code.map(|c| c.code().to_string()),
        }
    }
}

/// First known error code found along the cause chain.
pub fn error_code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(coded) = cause.downcast_ref::<CodedError>() {
            Some(coded.code)
        } else if let Some(sync) = cause.downcast_ref::<SyncError>() {
            Some(sync.error_code())
        } else if cause.downcast_ref::<LabelError>().is_some() {
            Some(ErrorCode::LabelSyncFailed)
        } else {
            cause.downcast_ref::<ConfigError>().map(ConfigError::error_code)
        }
    })
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Human summary of a finished sync run.
pub fn write_report(report: &SyncReport, w: &mut dyn Write) -> io::Result<()> {
    let heading = if report.dry_run {
        "sfsync sync (dry run)"
    } else {
        "sfsync sync"
    };
    writeln!(w, "{heading}")?;

    for decision in report.decisions.iter().filter(|d| is_noteworthy(d)) {
        let issue = decision
            .issue
            .map_or_else(|| "-".to_string(), |n| format!("#{n}"));
        writeln!(
            w,
            "  {:<9} {:<6} {} ({})",
            decision.action.as_str(),
            issue,
            decision.title,
            decision.test_id
        )?;
    }

    kv(w, "tests", report.tests)?;
    kv(w, "tracked issues", report.indexed_issues)?;
    if !report.labels_created.is_empty() {
        kv(w, "labels created", report.labels_created.join(", "))?;
    }
    kv(w, "created", report.created)?;
    kv(w, "updated", report.updated)?;
    kv(w, "reopened", report.reopened)?;
    kv(w, "closed", report.closed)?;
    kv(w, "orphans closed", report.orphans_closed)?;
    kv(w, "unchanged", report.unchanged)?;
    kv(w, "skipped", report.skipped)?;
    if report.duplicate_issues > 0 {
        kv(w, "duplicates", report.duplicate_issues)?;
    }
    if report.unmarked_issues > 0 {
        kv(w, "unmarked", report.unmarked_issues)?;
    }
    if report.paced_ms > 0 {
        kv(w, "paced", format!("{}ms", report.paced_ms))?;
    }
    Ok(())
}

fn is_noteworthy(decision: &Decision) -> bool {
    use sfsync_core::reconcile::ActionKind;
    !matches!(decision.action, ActionKind::Skip | ActionKind::Unchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfsync_core::reconcile::ActionKind;

    #[test]
    fn coded_error_is_found_through_context() {
        let err = anyhow::Error::new(CodedError::new(ErrorCode::InvalidRepoSlug, "bad slug"))
            .context("while parsing arguments");
        assert_eq!(error_code_of(&err), Some(ErrorCode::InvalidRepoSlug));

        let cli = CliError::from(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E1003"));
        assert!(cli.message.contains("while parsing arguments"));
        assert!(cli.message.contains("bad slug"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn plain_errors_have_no_code() {
        let err = anyhow::anyhow!("boom");
        let cli = CliError::from(&err);
        assert!(cli.error_code.is_none());
        assert!(cli.suggestion.is_none());
        assert_eq!(cli.message, "boom");
    }

    #[test]
    fn sync_errors_map_to_tracker_code() {
        let err = anyhow::Error::new(SyncError::Listing(anyhow::anyhow!("HTTP 502")));
        assert_eq!(error_code_of(&err), Some(ErrorCode::TrackerRequestFailed));
    }

    #[test]
    fn cli_error_json_omits_missing_fields() {
        let cli = CliError::from(&anyhow::anyhow!("boom"));
        let json = serde_json::to_value(&cli).expect("serialize");
        assert_eq!(json, serde_json::json!({ "message": "boom" }));
    }

    #[test]
    fn report_lists_only_actions_taken() {
        let report = SyncReport {
            tests: 2,
            created: 1,
            skipped: 1,
            decisions: vec![
                Decision {
                    test_id: "t1".to_string(),
                    title: "k: Check X".to_string(),
                    action: ActionKind::Create,
                    issue: Some(12),
                    close_reason: None,
                    skip_reason: None,
                },
                Decision {
                    test_id: "t2".to_string(),
                    title: "k: Check Y".to_string(),
                    action: ActionKind::Skip,
                    issue: None,
                    close_reason: None,
                    skip_reason: None,
                },
            ],
            ..SyncReport::default()
        };

        let mut buf = Vec::new();
        write_report(&report, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("create    #12    k: Check X (t1)"));
        assert!(!text.contains("Check Y"));
        assert!(text.contains("created:"));
    }
}
