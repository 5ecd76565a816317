pub mod completions;
pub mod labels;
pub mod sync;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sfsync_core::{ErrorCode, SyncConfig};

use crate::credentials::{self, GITHUB_TOKEN_ENV, SECUREFRAME_TOKEN_ENV};
use crate::github::RepoSlug;
use crate::output::CodedError;
use crate::secureframe::SecureframeClient;

/// Secureframe connection flags.
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Secureframe bearer token. Prefer --bearer-token-file or SECUREFRAME_TOKEN.
    #[arg(long, value_name = "TOKEN", conflicts_with = "bearer_token_file")]
    pub bearer_token: Option<String>,

    /// File holding the Secureframe bearer token.
    #[arg(long, value_name = "PATH")]
    pub bearer_token_file: Option<PathBuf>,

    /// Secureframe company user ID.
    #[arg(long, value_name = "ID")]
    pub company_id: Option<String>,

    #[command(flatten)]
    pub reports: ReportArgs,
}

impl CatalogArgs {
    /// Build a client, failing early when a credential is missing.
    pub fn client(&self, config: &SyncConfig) -> Result<SecureframeClient> {
        let token = credentials::resolve(
            self.bearer_token.as_deref(),
            self.bearer_token_file.as_deref(),
            SECUREFRAME_TOKEN_ENV,
        )?
        .ok_or_else(|| {
            CodedError::new(
                ErrorCode::MissingCredentials,
                format!(
                    "no Secureframe token: pass --bearer-token-file or set {SECUREFRAME_TOKEN_ENV}"
                ),
            )
        })?;

        let company_id = self
            .company_id
            .clone()
            .or_else(|| config.catalog.company_id.clone())
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                CodedError::new(
                    ErrorCode::MissingCredentials,
                    "no Secureframe company ID: pass --company-id or set catalog.company_id",
                )
            })?;

        Ok(SecureframeClient::new(
            &token,
            company_id,
            &config.catalog,
            &config.http,
        ))
    }
}

/// Report-key selection, shared by every command that scopes by framework.
#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Comma-delimited report keys (default from config: soc2_alpha).
    #[arg(long, value_name = "KEYS", value_delimiter = ',')]
    pub report_keys: Vec<String>,
}

impl ReportArgs {
    /// Flag values when given, else the configured keys.
    pub fn resolve(&self, config: &SyncConfig) -> Vec<String> {
        let keys: Vec<String> = self
            .report_keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            config.catalog.report_keys.clone()
        } else {
            keys
        }
    }
}

/// GitHub connection flags.
#[derive(Args, Debug, Clone, Default)]
pub struct TrackerArgs {
    /// File holding the GitHub token. Falls back to GITHUB_TOKEN.
    #[arg(long, value_name = "PATH")]
    pub github_token_file: Option<PathBuf>,

    /// Repository to open issues against.
    #[arg(long, value_name = "OWNER/REPO")]
    pub github_repo: Option<String>,

    /// Extra label applied to every issue sfsync writes.
    #[arg(long, value_name = "LABEL")]
    pub label: Option<String>,
}

impl TrackerArgs {
    pub fn repo(&self) -> Result<Option<RepoSlug>, CodedError> {
        self.github_repo.as_deref().map(RepoSlug::parse).transpose()
    }

    pub fn token(&self) -> Result<Option<String>> {
        credentials::resolve(None, self.github_token_file.as_deref(), GITHUB_TOKEN_ENV)
    }

    pub fn extra_label(&self) -> &str {
        self.label.as_deref().map_or("", str::trim)
    }
}

#[cfg(test)]
mod arg_tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        catalog: CatalogArgs,
        #[command(flatten)]
        tracker: TrackerArgs,
    }

    #[test]
    fn report_keys_split_on_commas() {
        let w = Wrapper::parse_from(["test", "--report-keys", "soc2_alpha, iso27001,,"]);
        let keys = w.catalog.reports.resolve(&SyncConfig::default());
        assert_eq!(keys, vec!["soc2_alpha", "iso27001"]);
    }

    #[test]
    fn report_keys_fall_back_to_config() {
        let w = Wrapper::parse_from(["test"]);
        let keys = w.catalog.reports.resolve(&SyncConfig::default());
        assert_eq!(keys, vec!["soc2_alpha"]);
    }

    #[test]
    fn inline_and_file_tokens_conflict() {
        let result = Wrapper::try_parse_from([
            "test",
            "--bearer-token",
            "abc",
            "--bearer-token-file",
            "/tmp/token",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_company_id_is_a_credential_error() {
        let w = Wrapper::parse_from(["test", "--bearer-token", "abc"]);
        let err = w
            .catalog
            .client(&SyncConfig::default())
            .err()
            .expect("company id required");
        let coded = err.downcast_ref::<CodedError>().expect("coded");
        assert_eq!(coded.code, ErrorCode::MissingCredentials);
        assert!(coded.message.contains("--company-id"));
    }

    #[test]
    fn company_id_comes_from_config() {
        let mut config = SyncConfig::default();
        config.catalog.company_id = Some("c-1".to_string());
        let w = Wrapper::parse_from(["test", "--bearer-token", "abc"]);
        assert!(w.catalog.client(&config).is_ok());
    }

    #[test]
    fn repo_slug_is_validated() {
        let w = Wrapper::parse_from(["test", "--github-repo", "not-a-slug"]);
        assert!(w.tracker.repo().is_err());

        let w = Wrapper::parse_from(["test", "--github-repo", "acme/compliance", "--label", " sec "]);
        assert_eq!(
            w.tracker.repo().expect("valid").map(|r| r.full_name()),
            Some("acme/compliance".to_string())
        );
        assert_eq!(w.tracker.extra_label(), "sec");
    }
}
