use anyhow::Result;
use clap::Args;
use sfsync_core::catalog;
use sfsync_core::{SyncConfig, SyncOptions};
use tracing::{info, warn};

use super::{CatalogArgs, TrackerArgs};
use crate::github::GitHubTracker;
use crate::output::{self, OutputMode};

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    #[command(flatten)]
    pub tracker: TrackerArgs,

    /// Compute and report every decision without writing to GitHub.
    #[arg(long)]
    pub dry_run: bool,
}

/// Fetch tests and reconcile them into GitHub issues.
///
/// Without a GitHub token or repository the run only reports failing tests.
pub fn run_sync(args: &SyncArgs, config: &SyncConfig, output: OutputMode) -> Result<()> {
    let repo = args.tracker.repo()?;
    let catalog_client = args.catalog.client(config)?;
    let github_token = args.tracker.token()?;
    let report_keys = args.catalog.reports.resolve(config);

    let tests = catalog::collect(&catalog_client, &report_keys)?;
    info!(
        count = tests.len(),
        requests = catalog_client.request_count(),
        "collected tests"
    );

    let (Some(repo), Some(token)) = (repo, github_token) else {
        warn!("no GitHub token or repository given; reporting failing tests only");
        return super::tests::render_tests(&tests, true, output);
    };

    let tracker = GitHubTracker::new(repo, token, &config.http);
    let options = SyncOptions::new(
        config,
        &report_keys,
        args.tracker.extra_label(),
        args.dry_run,
    );

    let report = sfsync_core::sync(&tracker, &tests, &options)?;
    info!(requests = tracker.request_count(), "GitHub requests issued");

    output::render(output, &report, |report, w| output::write_report(report, w))
}
