//! Domain types shared by the catalog, the tracker, and the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One compliance check fetched from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Test {
    /// Stable catalog identifier. Embedded verbatim in ticket bodies.
    pub id: String,
    /// Short human key, e.g. `github_branch_protection`.
    pub key: String,
    pub title: String,
    pub description: String,
    pub enabled: bool,
    pub pass: bool,
    pub disabled_justification: Option<String>,
    pub recommended_action: String,
    pub remediation_steps: String,
    /// Framework keys (report keys) this test belongs to.
    pub frameworks: Vec<String>,
    pub assertions: Vec<AssertionResult>,
}

impl Test {
    /// A test is actionable only when it is enabled and failing.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        self.enabled && !self.pass
    }

    /// Failing assertions that are still enabled, in catalog order.
    pub fn failing_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| a.enabled && !a.pass)
    }
}

/// One sub-check within a [`Test`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionResult {
    pub pass: bool,
    pub enabled: bool,
    pub fail_message: Option<String>,
    pub resource: Option<Resourceable>,
    /// Type tags; the catalog sends either one string or a list.
    pub assertion_type: Vec<String>,
}

impl Default for AssertionResult {
    fn default() -> Self {
        Self {
            pass: false,
            enabled: true,
            fail_message: None,
            resource: None,
            assertion_type: Vec::new(),
        }
    }
}

impl AssertionResult {
    #[must_use]
    pub fn type_label(&self) -> String {
        self.assertion_type.join(", ")
    }
}

/// Structured descriptor of the entity an assertion failed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resourceable {
    pub vendor_name: String,
    pub account: String,
    pub cloud_resource_type: String,
    pub region: String,
    pub user_name: String,
    pub repository_name: String,
    pub email: String,
    pub device_name: String,
    pub name: String,
    pub description: String,
    pub third_party_id: String,
}

impl Resourceable {
    /// Location fields ordered coarse to fine.
    #[must_use]
    pub fn location_fields(&self) -> [&str; 10] {
        [
            self.vendor_name.as_str(),
            self.account.as_str(),
            self.region.as_str(),
            self.user_name.as_str(),
            self.repository_name.as_str(),
            self.email.as_str(),
            self.device_name.as_str(),
            self.name.as_str(),
            self.description.as_str(),
            self.third_party_id.as_str(),
        ]
    }
}

/// A [`Test`] paired with the report key it was collected under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedTest {
    pub report_key: String,
    pub test: Test,
}

/// Open/closed state of a tracker issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Open,
    Closed,
}

impl TicketState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracker issue as seen at listing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: TicketState,
    pub labels: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TicketState::Open
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Rendered issue content, derived fresh from a [`Test`] on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueForm {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Full overwrite applied to an existing issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEdit {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub state: TicketState,
}

impl IssueEdit {
    /// Re-render an issue and keep (or put) it open.
    #[must_use]
    pub fn reopen_with(form: &IssueForm) -> Self {
        Self {
            title: form.title.clone(),
            body: form.body.clone(),
            labels: form.labels.clone(),
            state: TicketState::Open,
        }
    }

    /// Close an issue untouched apart from one appended label.
    #[must_use]
    pub fn close_with_label(ticket: &Ticket, label: &str) -> Self {
        let mut labels = ticket.labels.clone();
        if !ticket.has_label(label) {
            labels.push(label.to_string());
        }

        Self {
            title: ticket.title.clone(),
            body: ticket.body.clone(),
            labels,
            state: TicketState::Closed,
        }
    }
}

/// A label as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}
