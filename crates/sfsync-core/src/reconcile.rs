//! Reconciliation of catalog tests against tracker issues.
//!
//! Every run recomputes the full diff from live tracker state. Nothing is
//! persisted between runs; the `Secureframe ID` marker in each issue body is
//! the only link back to the test. A run that aborts halfway is repaired by
//! the next one.
//!
//! Decision table, per test:
//!
//! | issue   | pass  | enabled | action                          |
//! |---------|-------|---------|---------------------------------|
//! | none    | true  | any     | skip                            |
//! | none    | false | false   | skip                            |
//! | none    | false | true    | create                          |
//! | open    | any   | false   | close, append disabled label    |
//! | open    | true  | true    | close, append passing label     |
//! | open    | false | true    | update if title/body differ     |
//! | closed  | false | true    | reopen with fresh content       |
//! | closed  | other | other   | skip                            |
//!
//! A disabled test is never reported as passing: its open issue always gets
//! the disabled label. After the per-test pass, open issues whose test was
//! not fetched are closed with the disabled label.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::identity::IdentityIndex;
use crate::labels::{LabelTaxonomy, ensure_labels};
use crate::model::{IssueEdit, IssueForm, ScopedTest, Test, Ticket};
use crate::pacing::Pacer;
use crate::render::{RenderError, Renderer};
use crate::tracker::Tracker;

/// Why an issue gets closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Passing,
    Disabled,
    /// The test no longer exists upstream.
    Removed,
}

/// Why a test needs no tracker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Passing,
    Disabled,
    /// Closed issue whose test is not an enabled failure.
    Settled,
}

/// Outcome of [`decide`] for one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create(IssueForm),
    Update { number: u64, form: IssueForm },
    Reopen { number: u64, form: IssueForm },
    Close { number: u64, reason: CloseReason },
    Unchanged { number: u64 },
    Skip(SkipReason),
}

impl Action {
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Create(_) => ActionKind::Create,
            Self::Update { .. } => ActionKind::Update,
            Self::Reopen { .. } => ActionKind::Reopen,
            Self::Close { .. } => ActionKind::Close,
            Self::Unchanged { .. } => ActionKind::Unchanged,
            Self::Skip(_) => ActionKind::Skip,
        }
    }

    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Update { .. } | Self::Reopen { .. } | Self::Close { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Reopen,
    Close,
    Unchanged,
    Skip,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Reopen => "reopen",
            Self::Close => "close",
            Self::Unchanged => "unchanged",
            Self::Skip => "skip",
        }
    }
}

/// Decide what to do for `test` given the issue currently tracking it.
///
/// `render` is only invoked when the test is an enabled failure, so passing
/// and disabled tests never pay for rendering.
///
/// # Errors
///
/// Propagates a [`RenderError`] from `render`.
pub fn decide(
    ticket: Option<&Ticket>,
    test: &Test,
    render: impl FnOnce() -> Result<IssueForm, RenderError>,
) -> Result<Action, RenderError> {
    let action = match ticket {
        None if test.pass => Action::Skip(SkipReason::Passing),
        None if !test.enabled => Action::Skip(SkipReason::Disabled),
        None => Action::Create(render()?),
        Some(t) if t.is_open() && !test.enabled => Action::Close {
            number: t.number,
            reason: CloseReason::Disabled,
        },
        Some(t) if t.is_open() && test.pass => Action::Close {
            number: t.number,
            reason: CloseReason::Passing,
        },
        Some(t) if t.is_open() => {
            let form = render()?;
            if form.title == t.title && form.body == t.body {
                Action::Unchanged { number: t.number }
            } else {
                Action::Update {
                    number: t.number,
                    form,
                }
            }
        }
        Some(t) if test.is_actionable() => Action::Reopen {
            number: t.number,
            form: render()?,
        },
        Some(_) => Action::Skip(SkipReason::Settled),
    };

    Ok(action)
}

/// One reported decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub test_id: String,
    pub title: String,
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

/// End-of-run summary. Informational only; nothing reads it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub tests: usize,
    pub indexed_issues: usize,
    pub unmarked_issues: usize,
    pub duplicate_issues: usize,
    pub labels_created: Vec<String>,
    pub created: usize,
    pub updated: usize,
    pub reopened: usize,
    pub closed: usize,
    pub orphans_closed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Time spent waiting between mutations.
    pub paced_ms: u64,
    pub decisions: Vec<Decision>,
}

impl SyncReport {
    /// Mutations issued (or, in dry-run, intended).
    #[must_use]
    pub const fn mutations(&self) -> usize {
        self.created + self.updated + self.reopened + self.closed + self.orphans_closed
    }
}

/// Inputs of one sync run beyond the tests themselves.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions<'a> {
    pub config: &'a SyncConfig,
    pub report_keys: &'a [String],
    /// Optional label added to every created or re-rendered issue.
    pub extra_label: &'a str,
    pub dry_run: bool,
    /// Sleep used for pacing. Never called in dry-run.
    pub sleep: fn(Duration),
}

impl<'a> SyncOptions<'a> {
    /// Options that pace with `std::thread::sleep`.
    #[must_use]
    pub fn new(
        config: &'a SyncConfig,
        report_keys: &'a [String],
        extra_label: &'a str,
        dry_run: bool,
    ) -> Self {
        Self {
            config,
            report_keys,
            extra_label,
            dry_run,
            sleep: std::thread::sleep,
        }
    }

    fn pacer(&self) -> Pacer {
        Pacer::new(&self.config.pacing, self.dry_run).with_sleep(self.sleep)
    }
}

/// List synced issues, ensure labels, and reconcile `tests`.
///
/// # Errors
///
/// Any listing, label, render, or mutation failure aborts the run.
pub fn sync(
    tracker: &dyn Tracker,
    tests: &[ScopedTest],
    options: &SyncOptions<'_>,
) -> Result<SyncReport, SyncError> {
    let taxonomy = &options.config.labels;

    let tickets = tracker
        .list_issues(&taxonomy.sync)
        .map_err(SyncError::Listing)?;
    info!(count = tickets.len(), label = %taxonomy.sync, "listed synced issues");

    let index = IdentityIndex::build(tickets);
    if index.unmarked() > 0 {
        warn!(
            count = index.unmarked(),
            "synced issues without a test marker are ignored"
        );
    }

    let required = taxonomy.required(options.report_keys, options.extra_label);
    let labels_created =
        ensure_labels(tracker, &taxonomy.description, &required, options.dry_run)?;

    let renderer = Renderer::new(taxonomy, options.config.render.clone());
    let mut reconciler = Reconciler::new(tracker, &renderer, taxonomy, options);
    reconciler.ctx.report.labels_created = labels_created;
    reconciler.run(tests, &index)
}

/// Run-scoped state: pacing and counters.
#[derive(Debug)]
struct RunContext {
    pacer: Pacer,
    report: SyncReport,
}

/// Applies [`decide`] to every test and sweeps orphaned issues.
pub struct Reconciler<'a> {
    tracker: &'a dyn Tracker,
    renderer: &'a Renderer,
    taxonomy: &'a LabelTaxonomy,
    extra_label: &'a str,
    dry_run: bool,
    ctx: RunContext,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(
        tracker: &'a dyn Tracker,
        renderer: &'a Renderer,
        taxonomy: &'a LabelTaxonomy,
        options: &SyncOptions<'a>,
    ) -> Self {
        Self {
            tracker,
            renderer,
            taxonomy,
            extra_label: options.extra_label,
            dry_run: options.dry_run,
            ctx: RunContext {
                pacer: options.pacer(),
                report: SyncReport {
                    dry_run: options.dry_run,
                    ..SyncReport::default()
                },
            },
        }
    }

    /// Reconcile every test against `index`, then close orphans.
    ///
    /// # Errors
    ///
    /// Stops at the first render or tracker failure.
    pub fn run(
        mut self,
        tests: &[ScopedTest],
        index: &IdentityIndex,
    ) -> Result<SyncReport, SyncError> {
        self.ctx.report.tests = tests.len();
        self.ctx.report.indexed_issues = index.len();
        self.ctx.report.unmarked_issues = index.unmarked();
        self.ctx.report.duplicate_issues = index.duplicates();

        let mut seen = HashSet::with_capacity(tests.len());
        for scoped in tests {
            let test = &scoped.test;
            seen.insert(test.id.clone());

            let ticket = index.get(&test.id);
            let action = decide(ticket, test, || {
                self.renderer
                    .render(test, self.extra_label, &scoped.report_key)
            })
            .map_err(|source| SyncError::Render {
                test_id: test.id.clone(),
                source,
            })?;

            self.apply(&test.id, &display_title(test), ticket, action)?;
        }

        for (test_id, ticket) in index.orphans(&seen) {
            let action = Action::Close {
                number: ticket.number,
                reason: CloseReason::Removed,
            };
            self.apply(test_id, &ticket.title, Some(ticket), action)?;
        }

        self.ctx.report.paced_ms =
            u64::try_from(self.ctx.pacer.slept().as_millis()).unwrap_or(u64::MAX);

        info!(
            dry_run = self.dry_run,
            created = self.ctx.report.created,
            updated = self.ctx.report.updated,
            reopened = self.ctx.report.reopened,
            closed = self.ctx.report.closed,
            orphans_closed = self.ctx.report.orphans_closed,
            unchanged = self.ctx.report.unchanged,
            skipped = self.ctx.report.skipped,
            paced_ms = self.ctx.report.paced_ms,
            "reconciliation finished"
        );

        Ok(self.ctx.report)
    }

    fn apply(
        &mut self,
        test_id: &str,
        title: &str,
        ticket: Option<&Ticket>,
        action: Action,
    ) -> Result<(), SyncError> {
        let mut decision = Decision {
            test_id: test_id.to_string(),
            title: title.to_string(),
            action: action.kind(),
            issue: ticket.map(|t| t.number),
            close_reason: None,
            skip_reason: None,
        };

        if action.is_mutation() {
            self.ctx.pacer.before_mutation();
        } else {
            self.ctx.pacer.idle();
        }

        let verb = if self.dry_run { "[dry-run] would" } else { "will" };

        match action {
            Action::Create(form) => {
                info!(test_id, title = %form.title, "{verb} create issue");
                if !self.dry_run {
                    let number = self
                        .tracker
                        .create_issue(&form)
                        .map_err(|source| tracker_error("create", test_id, None, source))?;
                    decision.issue = Some(number);
                }
                self.ctx.report.created += 1;
            }
            Action::Update { number, form } => {
                info!(test_id, issue = number, "{verb} update issue");
                self.edit(number, &IssueEdit::reopen_with(&form), "update", test_id)?;
                self.ctx.report.updated += 1;
            }
            Action::Reopen { number, form } => {
                info!(test_id, issue = number, "{verb} reopen issue");
                self.edit(number, &IssueEdit::reopen_with(&form), "reopen", test_id)?;
                self.ctx.report.reopened += 1;
            }
            Action::Close { number, reason } => {
                let label = match reason {
                    CloseReason::Passing => &self.taxonomy.passing,
                    CloseReason::Disabled | CloseReason::Removed => &self.taxonomy.disabled,
                };
                info!(test_id, issue = number, ?reason, label = %label, "{verb} close issue");
                if let Some(ticket) = ticket {
                    let edit = IssueEdit::close_with_label(ticket, label);
                    self.edit(number, &edit, "close", test_id)?;
                }
                if reason == CloseReason::Removed {
                    self.ctx.report.orphans_closed += 1;
                } else {
                    self.ctx.report.closed += 1;
                }
                decision.close_reason = Some(reason);
            }
            Action::Unchanged { number } => {
                info!(test_id, issue = number, "issue is up to date");
                self.ctx.report.unchanged += 1;
            }
            Action::Skip(reason) => {
                info!(test_id, ?reason, "nothing to do");
                self.ctx.report.skipped += 1;
                decision.skip_reason = Some(reason);
            }
        }

        self.ctx.report.decisions.push(decision);
        Ok(())
    }

    fn edit(
        &self,
        number: u64,
        edit: &IssueEdit,
        action: &'static str,
        test_id: &str,
    ) -> Result<(), SyncError> {
        if self.dry_run {
            return Ok(());
        }

        self.tracker
            .edit_issue(number, edit)
            .map_err(|source| tracker_error(action, test_id, Some(number), source))
    }
}

fn tracker_error(
    action: &'static str,
    test_id: &str,
    number: Option<u64>,
    source: anyhow::Error,
) -> SyncError {
    let target = match number {
        Some(number) => format!("issue #{number} (test {test_id})"),
        None => format!("test {test_id}"),
    };
    SyncError::Tracker {
        action,
        target,
        source,
    }
}

fn display_title(test: &Test) -> String {
    format!("{}: {}", test.key, test.title)
}
