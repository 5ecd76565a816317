use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorCode;
use crate::labels::LabelTaxonomy;

/// Evidence portal linked from upload/select remediation text.
pub const DEFAULT_EVIDENCE_URL: &str =
    "https://app.secureframe.com/dashboard/incomplete-tests/soc2-beta";

pub const DEFAULT_CATALOG_ENDPOINT: &str = "https://app.secureframe.com/graphql";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub labels: LabelTaxonomy,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl PacingConfig {
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_evidence_url")]
    pub evidence_url: String,
    /// Resource values that carry no location information.
    #[serde(default = "default_ignored_resource_values")]
    pub ignored_resource_values: Vec<String>,
    /// Cap for one rendered item, in characters.
    #[serde(default = "default_item_limit")]
    pub item_limit: usize,
    /// Cap for the assembled body, in characters.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            evidence_url: default_evidence_url(),
            ignored_resource_values: default_ignored_resource_values(),
            item_limit: default_item_limit(),
            body_limit: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default = "default_report_keys")]
    pub report_keys: Vec<String>,
    /// Pause between per-test detail requests.
    #[serde(default = "default_detail_delay_ms")]
    pub detail_delay_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            company_id: None,
            report_keys: default_report_keys(),
            detail_delay_ms: default_detail_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Overall deadline for each outbound request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Wait before the single retry of a 5xx response.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Load configuration from `explicit`, else the user config directory, else defaults.
///
/// An explicitly named file must exist; the user-level file is optional.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    match user_config_path() {
        Some(path) if path.exists() => read_config(&path),
        _ => Ok(SyncConfig::default()),
    }
}

/// `<config dir>/sfsync/config.toml`, when the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sfsync").join("config.toml"))
}

fn read_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str::<SyncConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_evidence_url() -> String {
    DEFAULT_EVIDENCE_URL.to_string()
}

fn default_ignored_resource_values() -> Vec<String> {
    vec!["global".to_string()]
}

const fn default_item_limit() -> usize {
    2048
}

const fn default_body_limit() -> usize {
    32768
}

fn default_catalog_endpoint() -> String {
    DEFAULT_CATALOG_ENDPOINT.to_string()
}

fn default_report_keys() -> Vec<String> {
    vec!["soc2_alpha".to_string()]
}

const fn default_detail_delay_ms() -> u64 {
    100
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_retry_delay_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.labels.sync, "sframe");
        assert_eq!(cfg.labels.disabled, "disabled");
        assert_eq!(cfg.labels.passing, "passing");
        assert_eq!(cfg.render.item_limit, 2048);
        assert_eq!(cfg.render.body_limit, 32768);
        assert_eq!(cfg.render.ignored_resource_values, vec!["global"]);
        assert_eq!(cfg.catalog.report_keys, vec!["soc2_alpha"]);
        assert_eq!(cfg.http.retry_delay_ms, 2000);
        assert_eq!(cfg.pacing.base_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[labels]
sync = "compliance"

[pacing]
max_delay_ms = 3000

[catalog]
company_id = "c-1"
report_keys = ["iso27001", "soc2_beta"]
"#,
        )
        .expect("write config");

        let cfg = load_config(Some(&path)).expect("load");
        assert_eq!(cfg.labels.sync, "compliance");
        assert_eq!(cfg.labels.passing, "passing");
        assert_eq!(cfg.pacing.max_delay_ms, 3000);
        assert_eq!(cfg.pacing.base_delay_ms, 500);
        assert_eq!(cfg.catalog.company_id.as_deref(), Some("c-1"));
        assert_eq!(cfg.catalog.report_keys, vec!["iso27001", "soc2_beta"]);
        assert_eq!(cfg.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
        assert_eq!(cfg.render, RenderConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pacing\nbase_delay_ms = ").expect("write config");

        let err = load_config(Some(&path)).expect_err("parse must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.error_code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_config(Some(&dir.path().join("nope.toml"))).expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
