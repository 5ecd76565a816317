//! GitHub Issues as a [`Tracker`].

use std::cell::Cell;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sfsync_core::ErrorCode;
use sfsync_core::config::HttpConfig;
use sfsync_core::model::{IssueEdit, IssueForm, Label, Ticket, TicketState};
use sfsync_core::tracker::Tracker;
use tracing::debug;

use crate::http;
use crate::output::CodedError;

pub const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    /// Parse `<owner>/<repo>`.
    ///
    /// # Errors
    ///
    /// Anything else is rejected with [`ErrorCode::InvalidRepoSlug`].
    pub fn parse(raw: &str) -> Result<Self, CodedError> {
        let trimmed = raw.trim();
        let invalid = || {
            CodedError::new(
                ErrorCode::InvalidRepoSlug,
                format!("invalid repo slug '{trimmed}': expected <owner>/<repo>"),
            )
        };

        let (owner, repo) = trimmed.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: TicketState,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for Ticket {
    fn from(issue: GitHubIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            state: issue.state,
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            updated_at: issue.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

#[derive(Debug, Serialize)]
struct NewLabel<'a> {
    name: &'a str,
    description: &'a str,
}

/// REST v3 client scoped to one repository.
pub struct GitHubTracker {
    agent: ureq::Agent,
    api_base: String,
    repo: RepoSlug,
    token: String,
    retry_delay: Duration,
    requests: Cell<usize>,
}

impl GitHubTracker {
    pub fn new(repo: RepoSlug, token: String, config: &HttpConfig) -> Self {
        Self {
            agent: http::agent(config),
            api_base: API_BASE.to_string(),
            repo,
            token,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            requests: Cell::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}",
            self.api_base, self.repo.owner, self.repo.repo
        )
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.requests.set(self.requests.get() + 1);
        debug!(method, url, "GitHub request");

        self.agent
            .request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28")
            .set("Authorization", &format!("Bearer {}", self.token))
    }

    /// One page of issues carrying `label`, newest first.
    fn list_request(&self, label: &str, page: u32) -> ureq::Request {
        self.request("GET", &self.repo_url("issues"))
            .query("state", "all")
            .query("labels", label)
            .query("sort", "updated")
            .query("direction", "desc")
            .query("per_page", &PER_PAGE.to_string())
            .query("page", &page.to_string())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        build: impl Fn() -> ureq::Request,
    ) -> Result<T> {
        let response = http::send_with_retry(self.retry_delay, || build().call())
            .map_err(http::describe)
            .with_context(|| format!("GitHub API request failed for {what}"))?;

        response
            .into_json::<T>()
            .context("failed to decode GitHub API JSON response")
    }

    fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = http::send_with_retry(self.retry_delay, || {
            self.request(method, url).send_json(body)
        })
        .map_err(http::describe)
        .with_context(|| format!("GitHub API {method} failed for {url}"))?;

        response
            .into_json::<T>()
            .context("failed to decode GitHub API JSON response")
    }
}

impl Tracker for GitHubTracker {
    fn list_issues(&self, label: &str) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        let mut page = 1_u32;

        loop {
            let batch: Vec<GitHubIssue> = self
                .get_json("issues", || self.list_request(label, page))
                .with_context(|| format!("failed to fetch issues page {page}"))?;

            if batch.is_empty() {
                break;
            }

            let raw_len = batch.len();
            tickets.extend(
                batch
                    .into_iter()
                    .filter(|issue| issue.pull_request.is_none())
                    .map(Ticket::from),
            );

            if raw_len < PER_PAGE {
                break;
            }

            page += 1;
        }

        debug!(
            repo = %self.repo.full_name(),
            count = tickets.len(),
            requests = self.request_count(),
            "listed issues"
        );
        Ok(tickets)
    }

    fn create_issue(&self, form: &IssueForm) -> Result<u64> {
        let created: CreatedIssue = self.send_json("POST", &self.repo_url("issues"), form)?;
        Ok(created.number)
    }

    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<()> {
        let _: serde_json::Value =
            self.send_json("PATCH", &self.repo_url(&format!("issues/{number}")), edit)?;
        Ok(())
    }

    fn get_label(&self, name: &str) -> Result<Option<Label>> {
        let url = self.repo_url(&format!("labels/{}", encode_component(name)));
        let response =
            match http::send_with_retry(self.retry_delay, || self.request("GET", &url).call()) {
                Ok(response) => response,
                Err(ureq::Error::Status(404, _)) => return Ok(None),
                Err(err) => {
                    return Err(http::describe(err))
                        .with_context(|| format!("GitHub API request failed for {url}"));
                }
            };

        let label: GitHubLabel = response
            .into_json()
            .context("failed to decode GitHub label")?;
        Ok(Some(Label {
            name: label.name,
            description: label.description,
        }))
    }

    fn create_label(&self, name: &str, description: &str) -> Result<()> {
        let _: serde_json::Value = self.send_json(
            "POST",
            &self.repo_url("labels"),
            &NewLabel { name, description },
        )?;
        Ok(())
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
