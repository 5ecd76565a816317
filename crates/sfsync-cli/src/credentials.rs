//! Token loading for the Secureframe and GitHub clients.
//!
//! Precedence: inline flag, then token file, then environment variable.
//! Surrounding whitespace is trimmed and an empty token counts as absent.

use std::path::Path;

use anyhow::{Context as _, Result};

pub const SECUREFRAME_TOKEN_ENV: &str = "SECUREFRAME_TOKEN";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Resolve a token from its flag, file, and environment variable.
///
/// # Errors
///
/// Fails only when a token file was named but cannot be read.
pub fn resolve(inline: Option<&str>, file: Option<&Path>, env_var: &str) -> Result<Option<String>> {
    resolve_with(inline, file, std::env::var(env_var).ok())
}

fn resolve_with(
    inline: Option<&str>,
    file: Option<&Path>,
    env_value: Option<String>,
) -> Result<Option<String>> {
    if let Some(token) = inline.and_then(non_empty) {
        return Ok(Some(token));
    }

    if let Some(path) = file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token file {}", path.display()))?;
        return Ok(non_empty(&raw));
    }

    Ok(env_value.as_deref().and_then(non_empty))
}

fn non_empty(raw: &str) -> Option<String> {
    let token = raw.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_file_is_trimmed() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("token");
        std::fs::write(&path, "  ghp_abc123\n").expect("write token");

        let token = resolve_with(None, Some(&path), None).expect("resolve");
        assert_eq!(token.as_deref(), Some("ghp_abc123"));
    }

    #[test]
    fn blank_token_file_counts_as_absent() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("token");
        std::fs::write(&path, "\n\n").expect("write token");

        let token = resolve_with(None, Some(&path), Some("from-env".to_string()))
            .expect("resolve");
        assert_eq!(token, None, "an explicit file wins over the environment");
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let err = resolve_with(None, Some(&dir.path().join("absent")), None)
            .expect_err("unreadable file");
        assert!(err.to_string().contains("failed to read token file"));
    }

    #[test]
    fn inline_beats_environment() {
        let token = resolve_with(Some("inline"), None, Some("env".to_string())).expect("resolve");
        assert_eq!(token.as_deref(), Some("inline"));

        let token = resolve_with(Some("  "), None, Some("env".to_string())).expect("resolve");
        assert_eq!(token.as_deref(), Some("env"));

        assert_eq!(resolve_with(None, None, None).expect("resolve"), None);
    }
}
