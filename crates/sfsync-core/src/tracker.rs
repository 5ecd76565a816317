//! The issue-tracker seam.
//!
//! The reconciler only ever talks to a tracker through [`Tracker`]. The CLI
//! provides the GitHub implementation; [`MemoryTracker`] backs tests and
//! offline rehearsals.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{IssueEdit, IssueForm, Label, Ticket, TicketState};

/// Operations the engine needs from an issue tracker.
pub trait Tracker {
    /// Every issue (open and closed) carrying `label`, most recently updated first.
    fn list_issues(&self, label: &str) -> Result<Vec<Ticket>>;

    /// Open a new issue and return its number.
    fn create_issue(&self, form: &IssueForm) -> Result<u64>;

    /// Overwrite title, body, labels, and state of an existing issue.
    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<()>;

    /// Look a label up by name; `Ok(None)` when it does not exist.
    fn get_label(&self, name: &str) -> Result<Option<Label>>;

    fn create_label(&self, name: &str, description: &str) -> Result<()>;
}

/// One call observed by [`MemoryTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    List(String),
    Create(IssueForm),
    Edit(u64, IssueEdit),
    GetLabel(String),
    CreateLabel(String),
}

impl TrackerCall {
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Edit(..) | Self::CreateLabel(_))
    }
}

/// In-memory tracker that records every call.
///
/// Each mutation advances a logical clock by one second, so `updated_at`
/// ordering follows mutation order.
#[derive(Debug)]
pub struct MemoryTracker {
    issues: RefCell<BTreeMap<u64, Ticket>>,
    labels: RefCell<BTreeMap<String, Label>>,
    calls: RefCell<Vec<TrackerCall>>,
    next_number: Cell<u64>,
    clock: Cell<DateTime<Utc>>,
    mutation_budget: Cell<Option<usize>>,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issues: RefCell::new(BTreeMap::new()),
            labels: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            next_number: Cell::new(1),
            clock: Cell::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()),
            mutation_budget: Cell::new(None),
        }
    }

    /// Insert an issue directly, bypassing call recording.
    pub fn seed_issue(&self, ticket: Ticket) {
        if ticket.number >= self.next_number.get() {
            self.next_number.set(ticket.number + 1);
        }
        self.issues.borrow_mut().insert(ticket.number, ticket);
    }

    /// Register a label directly, bypassing call recording.
    pub fn seed_label(&self, name: &str) {
        self.labels.borrow_mut().insert(
            name.to_string(),
            Label {
                name: name.to_string(),
                description: None,
            },
        );
    }

    /// Let `count` more mutations succeed, then fail every later one.
    pub fn fail_mutations_after(&self, count: usize) {
        self.mutation_budget.set(Some(count));
    }

    #[must_use]
    pub fn issue(&self, number: u64) -> Option<Ticket> {
        self.issues.borrow().get(&number).cloned()
    }

    #[must_use]
    pub fn issues(&self) -> Vec<Ticket> {
        self.issues.borrow().values().cloned().collect()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.borrow().clone()
    }

    /// Number of recorded mutating calls.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: TrackerCall) -> Result<()> {
        let mutation = call.is_mutation();
        self.calls.borrow_mut().push(call);
        if !mutation {
            return Ok(());
        }

        match self.mutation_budget.get() {
            Some(0) => bail!("injected tracker failure"),
            Some(left) => self.mutation_budget.set(Some(left - 1)),
            None => {}
        }
        Ok(())
    }

    fn tick(&self) -> DateTime<Utc> {
        let now = self.clock.get() + TimeDelta::seconds(1);
        self.clock.set(now);
        now
    }
}

impl Tracker for MemoryTracker {
    fn list_issues(&self, label: &str) -> Result<Vec<Ticket>> {
        self.record(TrackerCall::List(label.to_string()))?;

        let mut tickets: Vec<Ticket> = self
            .issues
            .borrow()
            .values()
            .filter(|t| t.has_label(label))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(tickets)
    }

    fn create_issue(&self, form: &IssueForm) -> Result<u64> {
        self.record(TrackerCall::Create(form.clone()))?;

        let number = self.next_number.get();
        self.next_number.set(number + 1);
        let ticket = Ticket {
            number,
            title: form.title.clone(),
            body: form.body.clone(),
            state: TicketState::Open,
            labels: form.labels.clone(),
            updated_at: self.tick(),
        };
        self.issues.borrow_mut().insert(number, ticket);
        Ok(number)
    }

    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<()> {
        self.record(TrackerCall::Edit(number, edit.clone()))?;

        let updated_at = self.tick();
        let mut issues = self.issues.borrow_mut();
        let ticket = issues
            .get_mut(&number)
            .ok_or_else(|| anyhow!("issue #{number} not found"))?;
        ticket.title.clone_from(&edit.title);
        ticket.body.clone_from(&edit.body);
        ticket.labels.clone_from(&edit.labels);
        ticket.state = edit.state;
        ticket.updated_at = updated_at;
        Ok(())
    }

    fn get_label(&self, name: &str) -> Result<Option<Label>> {
        self.record(TrackerCall::GetLabel(name.to_string()))?;
        Ok(self.labels.borrow().get(name).cloned())
    }

    fn create_label(&self, name: &str, description: &str) -> Result<()> {
        self.record(TrackerCall::CreateLabel(name.to_string()))?;

        let mut labels = self.labels.borrow_mut();
        if labels.contains_key(name) {
            bail!("label {name:?} already exists");
        }
        labels.insert(
            name.to_string(),
            Label {
                name: name.to_string(),
                description: Some(description.to_string()),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str) -> IssueForm {
        IssueForm {
            title: title.to_string(),
            body: format!("body of {title}"),
            labels: vec!["sframe".to_string()],
        }
    }

    #[test]
    fn listing_filters_by_label_and_orders_by_update() {
        let tracker = MemoryTracker::new();
        let first = tracker.create_issue(&form("a")).expect("create");
        let second = tracker.create_issue(&form("b")).expect("create");
        tracker
            .create_issue(&IssueForm {
                labels: vec!["other".to_string()],
                ..form("c")
            })
            .expect("create");

        tracker
            .edit_issue(first, &IssueEdit::reopen_with(&form("a2")))
            .expect("edit");

        let listed: Vec<u64> = tracker
            .list_issues("sframe")
            .expect("list")
            .iter()
            .map(|t| t.number)
            .collect();
        assert_eq!(listed, vec![first, second]);
    }

    #[test]
    fn mutation_budget_injects_failures() {
        let tracker = MemoryTracker::new();
        tracker.fail_mutations_after(1);

        assert!(tracker.create_issue(&form("a")).is_ok());
        assert!(tracker.create_issue(&form("b")).is_err());
        assert!(tracker.list_issues("sframe").is_ok(), "reads are unaffected");
    }

    #[test]
    fn editing_unknown_issue_fails() {
        let tracker = MemoryTracker::new();
        assert!(tracker.edit_issue(42, &IssueEdit::reopen_with(&form("x"))).is_err());
    }
}
