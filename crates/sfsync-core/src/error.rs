use std::fmt;

use crate::render::RenderError;

/// Machine-readable error codes for operator- and script-friendly decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MissingCredentials,
    InvalidRepoSlug,
    CatalogRequestFailed,
    CatalogRejected,
    TrackerRequestFailed,
    LabelSyncFailed,
    RenderFailed,
}

impl ErrorCode {
    pub const ALL: [Self; 8] = [
        Self::ConfigParseError,
        Self::MissingCredentials,
        Self::InvalidRepoSlug,
        Self::CatalogRequestFailed,
        Self::CatalogRejected,
        Self::TrackerRequestFailed,
        Self::LabelSyncFailed,
        Self::RenderFailed,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MissingCredentials => "E1002",
            Self::InvalidRepoSlug => "E1003",
            Self::CatalogRequestFailed => "E2001",
            Self::CatalogRejected => "E2002",
            Self::TrackerRequestFailed => "E3001",
            Self::LabelSyncFailed => "E3002",
            Self::RenderFailed => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MissingCredentials => "Missing credentials",
            Self::InvalidRepoSlug => "Invalid repository slug",
            Self::CatalogRequestFailed => "Secureframe request failed",
            Self::CatalogRejected => "Secureframe returned errors",
            Self::TrackerRequestFailed => "GitHub request failed",
            Self::LabelSyncFailed => "Label synchronization failed",
            Self::RenderFailed => "Issue rendering failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the sfsync config.toml and retry."),
            Self::MissingCredentials => Some(
                "Pass --bearer-token-file (or SECUREFRAME_TOKEN), --company-id, and --github-token-file (or GITHUB_TOKEN).",
            ),
            Self::InvalidRepoSlug => Some("Use --github-repo <owner>/<repo>."),
            Self::CatalogRequestFailed | Self::TrackerRequestFailed => Some(
                "Re-run sfsync; decisions are recomputed from live state, so a rerun is safe.",
            ),
            Self::CatalogRejected => Some("Check the bearer token and company ID."),
            Self::LabelSyncFailed => {
                Some("Check that the GitHub token can manage labels on the target repository.")
            }
            Self::RenderFailed => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Fatal reconciliation failures. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to render issue for test {test_id}: {source}")]
    Render {
        test_id: String,
        #[source]
        source: RenderError,
    },

    #[error("failed to list synced issues: {0:#}")]
    Listing(#[source] anyhow::Error),

    #[error("{action} failed for {target}: {source:#}")]
    Tracker {
        action: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Labels(#[from] crate::labels::LabelError),
}

impl SyncError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Render { .. } => ErrorCode::RenderFailed,
            Self::Listing(_) | Self::Tracker { .. } => ErrorCode::TrackerRequestFailed,
            Self::Labels(_) => ErrorCode::LabelSyncFailed,
        }
    }
}
