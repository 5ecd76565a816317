use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sfsync_core::labels::ensure_labels;
use sfsync_core::{ErrorCode, SyncConfig};

use super::{ReportArgs, TrackerArgs};
use crate::github::GitHubTracker;
use crate::output::{self, CodedError, OutputMode};

#[derive(Args, Debug, Clone, Default)]
pub struct LabelsArgs {
    #[command(flatten)]
    pub tracker: TrackerArgs,

    #[command(flatten)]
    pub reports: ReportArgs,

    /// Report missing labels without creating them.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct LabelsOutcome {
    repo: String,
    dry_run: bool,
    required: Vec<String>,
    created: Vec<String>,
}

/// Make sure every label a sync could apply exists on the repository.
pub fn run_labels(args: &LabelsArgs, config: &SyncConfig, output: OutputMode) -> Result<()> {
    let repo = args.tracker.repo()?.ok_or_else(|| {
        CodedError::new(ErrorCode::InvalidRepoSlug, "missing required flag: --github-repo")
    })?;
    let token = args.tracker.token()?.ok_or_else(|| {
        CodedError::new(
            ErrorCode::MissingCredentials,
            "no GitHub token: pass --github-token-file or set GITHUB_TOKEN",
        )
    })?;

    let taxonomy = &config.labels;
    let required = taxonomy.required(&args.reports.resolve(config), args.tracker.extra_label());

    let outcome = LabelsOutcome {
        repo: repo.full_name(),
        dry_run: args.dry_run,
        created: ensure_labels(
            &GitHubTracker::new(repo, token, &config.http),
            &taxonomy.description,
            &required,
            args.dry_run,
        )?,
        required,
    };

    output::render(output, &outcome, |outcome, w| write_outcome(outcome, w))
}

fn write_outcome(outcome: &LabelsOutcome, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "sfsync labels {}", outcome.repo)?;
    for label in &outcome.required {
        let state = if !outcome.created.contains(label) {
            "ok"
        } else if outcome.dry_run {
            "missing"
        } else {
            "created"
        };
        writeln!(w, "  {label:<20} {state}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_marks_each_label() {
        let outcome = LabelsOutcome {
            repo: "acme/compliance".to_string(),
            dry_run: false,
            required: vec!["sframe".to_string(), "soc2".to_string()],
            created: vec!["soc2".to_string()],
        };
        let mut buf = Vec::new();
        write_outcome(&outcome, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.starts_with("sfsync labels acme/compliance\n"));
        assert!(text.contains("sframe               ok"));
        assert!(text.contains("soc2                 created"));
    }

    #[test]
    fn dry_run_reports_missing() {
        let outcome = LabelsOutcome {
            repo: "acme/compliance".to_string(),
            dry_run: true,
            required: vec!["passing".to_string()],
            created: vec!["passing".to_string()],
        };
        let mut buf = Vec::new();
        write_outcome(&outcome, &mut buf).expect("write");
        assert!(String::from_utf8(buf).expect("utf8").contains("passing              missing"));
    }

    #[test]
    fn repo_is_required() {
        let err = run_labels(&LabelsArgs::default(), &SyncConfig::default(), OutputMode::Human)
            .expect_err("no repo");
        assert_eq!(crate::output::error_code_of(&err), Some(ErrorCode::InvalidRepoSlug));
    }
}
