//! Rendering of catalog tests into issue title, body, and labels.
//!
//! Output is a pure function of the test, the report key, the extra label,
//! and [`RenderConfig`]. The reconciler relies on that: an unchanged test must
//! render byte-for-byte the same body so no update is issued.
//!
//! Body layout:
//!
//! ```text
//! Secureframe ID: <id>
//! Report: <report key>
//!
//! ## Description
//! ## Remediation            (omitted when empty)
//! ## Failing assertions     (omitted when none)
//! ## Disabled justification (omitted when empty)
//! ```
//!
//! The marker line comes first so body truncation can never cut it off.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::RenderConfig;
use crate::identity::{extract_test_id, marker_line};
use crate::labels::{LabelTaxonomy, report_label};
use crate::model::{AssertionResult, IssueForm, Resourceable, Test};

/// Appended to any text cut by [`truncate`].
pub const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to format issue body: {0}")]
    Format(#[from] fmt::Error),

    #[error("test has an empty identifier")]
    MissingId,

    #[error("test identifier {0:?} would not be recoverable from the issue body")]
    UnrecoverableId(String),
}

/// Renders [`IssueForm`]s for one run.
#[derive(Debug, Clone)]
pub struct Renderer {
    sync_label: String,
    config: RenderConfig,
}

impl Renderer {
    #[must_use]
    pub fn new(taxonomy: &LabelTaxonomy, config: RenderConfig) -> Self {
        Self {
            sync_label: taxonomy.sync.clone(),
            config,
        }
    }

    /// Render `test` as collected under `report_key`.
    ///
    /// # Errors
    ///
    /// Fails when the test ID could not be recovered from the rendered body,
    /// or when formatting fails. No partial form is returned.
    pub fn render(
        &self,
        test: &Test,
        extra_label: &str,
        report_key: &str,
    ) -> Result<IssueForm, RenderError> {
        if test.id.is_empty() {
            return Err(RenderError::MissingId);
        }

        let marker = marker_line(&test.id);
        if extract_test_id(&marker) != Some(test.id.as_str()) {
            return Err(RenderError::UnrecoverableId(test.id.clone()));
        }

        let body = self.body(test, report_key, &marker)?;

        Ok(IssueForm {
            title: format!("{}: {}", test.key, test.title),
            body: truncate(&body, self.config.body_limit).into_owned(),
            labels: self.labels(extra_label, report_key),
        })
    }

    fn labels(&self, extra_label: &str, report_key: &str) -> Vec<String> {
        let candidates = [self.sync_label.as_str(), report_label(report_key), extra_label];

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(str::trim)
            .filter(|label| !label.is_empty() && seen.insert(*label))
            .map(ToOwned::to_owned)
            .collect()
    }

    fn body(&self, test: &Test, report_key: &str, marker: &str) -> Result<String, RenderError> {
        let mut body = String::new();

        writeln!(body, "{marker}")?;
        writeln!(body, "Report: {report_key}")?;

        writeln!(body)?;
        writeln!(body, "## Description")?;
        writeln!(body)?;
        writeln!(body, "{}", self.item(&test.description))?;

        let remediation: Vec<String> = [&test.recommended_action, &test.remediation_steps]
            .into_iter()
            .map(|text| self.item(text))
            .filter(|text| !text.is_empty())
            .collect();
        if !remediation.is_empty() {
            writeln!(body)?;
            writeln!(body, "## Remediation")?;
            for text in remediation {
                writeln!(body)?;
                writeln!(body, "{text}")?;
            }
        }

        let mut failing = test.failing_assertions().peekable();
        if failing.peek().is_some() {
            writeln!(body)?;
            writeln!(body, "## Failing assertions")?;
            writeln!(body)?;
            for assertion in failing {
                let line = self.assertion_work(assertion);
                writeln!(body, "- {}", truncate(&line, self.config.item_limit))?;
            }
        }

        if let Some(justification) = test.disabled_justification.as_deref() {
            let justification = self.item(justification);
            if !justification.is_empty() {
                writeln!(body)?;
                writeln!(body, "## Disabled justification")?;
                writeln!(body)?;
                writeln!(body, "{justification}")?;
            }
        }

        Ok(body)
    }

    /// Convert one source field and cap its length.
    fn item(&self, raw: &str) -> String {
        truncate(&to_markdown(raw), self.config.item_limit).into_owned()
    }

    /// Describe what needs to happen to fix one failing assertion.
    #[must_use]
    pub fn assertion_work(&self, assertion: &AssertionResult) -> String {
        let mut work = assertion
            .fail_message
            .as_deref()
            .map(to_markdown)
            .unwrap_or_default();

        if work.is_empty() {
            let kind = assertion.type_label();
            work = if kind.is_empty() {
                "Upload evidence".to_string()
            } else {
                format!("Upload evidence for {kind}")
            };
        }

        if let Some(resource) = &assertion.resource {
            let location = self.resource_location(resource);
            if location.is_empty() {
                return work;
            }
            return format!("{location}: {work}");
        }

        let url = &self.config.evidence_url;
        if work.starts_with("Upload") {
            return format!("{} to {url}", work.trim_end_matches('.'));
        }

        if work.starts_with("Select") && work.ends_with("Policy") {
            return format!("{work} at {url}");
        }

        work
    }

    /// Compose a coarse-to-fine location such as `AWS > 1234 > us-east-1 > bucket`.
    #[must_use]
    pub fn resource_location(&self, resource: &Resourceable) -> String {
        let mut seen = HashSet::new();
        let mut parts = Vec::new();

        for value in resource.location_fields() {
            let value = value.trim();
            let first_sighting = seen.insert(value);
            if !first_sighting || value.chars().count() <= 1 {
                continue;
            }
            if self.config.ignored_resource_values.iter().any(|v| v == value) {
                continue;
            }
            parts.push(value);
        }

        parts.join(" > ")
    }
}

/// Cut `text` to `limit` characters, appending [`ELLIPSIS`] when anything was dropped.
#[must_use]
pub fn truncate(text: &str, limit: usize) -> Cow<'_, str> {
    match text.char_indices().nth(limit) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}{ELLIPSIS}", &text[..cut])),
    }
}

/// Convert HTML fragments to Markdown; plain text is only trimmed.
#[must_use]
pub fn to_markdown(raw: &str) -> String {
    let trimmed = raw.trim();
    if !looks_like_markup(trimmed) {
        return trimmed.to_string();
    }

    html2md::parse_html(trimmed).trim().to_string()
}

/// A closing tag, a void element, or a character entity.
static MARKUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"</[A-Za-z][A-Za-z0-9]*\s*>|<(?:br|hr|img)\b[^<>]*>|&(?:[A-Za-z]+|#[0-9]+|#[xX][0-9A-Fa-f]+);",
    )
    .expect("invalid markup pattern")
});

fn looks_like_markup(text: &str) -> bool {
    MARKUP_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer {
        Renderer::new(&LabelTaxonomy::default(), RenderConfig::default())
    }

    fn failing(message: &str) -> AssertionResult {
        AssertionResult {
            fail_message: Some(message.to_string()),
            assertion_type: vec!["policy".to_string()],
            ..AssertionResult::default()
        }
    }

    fn sample_test() -> Test {
        Test {
            id: "t1".to_string(),
            key: "branch_protection".to_string(),
            title: "Check X".to_string(),
            description: "Branches must be protected.".to_string(),
            enabled: true,
            pass: false,
            recommended_action: "Enable branch protection.".to_string(),
            assertions: vec![failing("Repository main is unprotected")],
            ..Test::default()
        }
    }

    #[test]
    fn title_joins_key_and_title() {
        let form = renderer().render(&sample_test(), "", "soc2_alpha").expect("render");
        assert_eq!(form.title, "branch_protection: Check X");
    }

    #[test]
    fn body_starts_with_marker_and_lists_failures() {
        let form = renderer().render(&sample_test(), "", "soc2_alpha").expect("render");
        assert!(form.body.starts_with("Secureframe ID: t1\nReport: soc2_alpha\n"));
        assert!(form.body.contains("## Description\n\nBranches must be protected.\n"));
        assert!(form.body.contains("## Remediation\n\nEnable branch protection.\n"));
        assert!(form.body.contains("- Repository main is unprotected\n"));
        assert!(!form.body.contains("## Disabled justification"));
    }

    #[test]
    fn labels_are_deduplicated_and_ordered() {
        let r = renderer();
        let form = r.render(&sample_test(), "security", "soc2_alpha").expect("render");
        assert_eq!(form.labels, vec!["sframe", "soc2", "security"]);

        let dup = r.render(&sample_test(), "soc2", "soc2_alpha").expect("render");
        assert_eq!(dup.labels, vec!["sframe", "soc2"]);

        let bare = r.render(&sample_test(), "", "").expect("render");
        assert_eq!(bare.labels, vec!["sframe"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = renderer();
        let a = r.render(&sample_test(), "x", "soc2_alpha").expect("render");
        let b = r.render(&sample_test(), "x", "soc2_alpha").expect("render");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_fail_message_synthesizes_upload_text() {
        let assertion = AssertionResult {
            assertion_type: vec!["security awareness training".to_string()],
            ..AssertionResult::default()
        };
        let work = renderer().assertion_work(&assertion);
        assert_eq!(
            work,
            format!(
                "Upload evidence for security awareness training to {}",
                RenderConfig::default().evidence_url
            )
        );
    }

    #[test]
    fn upload_messages_lose_trailing_periods() {
        let work = renderer().assertion_work(&failing("  Upload the SOC 2 report...  "));
        assert!(work.starts_with("Upload the SOC 2 report to https://"));
    }

    #[test]
    fn select_policy_messages_point_at_portal() {
        let work = renderer().assertion_work(&failing("Select an Acceptable Use Policy"));
        assert_eq!(
            work,
            format!(
                "Select an Acceptable Use Policy at {}",
                RenderConfig::default().evidence_url
            )
        );

        let unchanged = renderer().assertion_work(&failing("Select a vendor"));
        assert_eq!(unchanged, "Select a vendor");
    }

    #[test]
    fn resource_location_skips_noise_and_duplicates() {
        let resource = Resourceable {
            vendor_name: "AWS".to_string(),
            account: "123456789012".to_string(),
            region: "global".to_string(),
            name: "123456789012".to_string(),
            description: "x".to_string(),
            third_party_id: "arn:aws:s3:::logs".to_string(),
            ..Resourceable::default()
        };
        assert_eq!(
            renderer().resource_location(&resource),
            "AWS > 123456789012 > arn:aws:s3:::logs"
        );
    }

    #[test]
    fn resourceable_assertion_prefixes_location() {
        let assertion = AssertionResult {
            fail_message: Some("MFA is disabled".to_string()),
            resource: Some(Resourceable {
                user_name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                ..Resourceable::default()
            }),
            ..AssertionResult::default()
        };
        assert_eq!(
            renderer().assertion_work(&assertion),
            "Ada Lovelace > ada@example.com: MFA is disabled"
        );
    }

    #[test]
    fn resourceable_assertion_keeps_default_upload_text_without_url() {
        let assertion = AssertionResult {
            assertion_type: vec!["device".to_string()],
            resource: Some(Resourceable {
                device_name: "laptop-17".to_string(),
                ..Resourceable::default()
            }),
            ..AssertionResult::default()
        };
        assert_eq!(
            renderer().assertion_work(&assertion),
            "laptop-17: Upload evidence for device"
        );
    }

    #[test]
    fn long_fail_message_is_capped() {
        let mut test = sample_test();
        test.assertions = vec![failing(&"a".repeat(5000))];
        let form = renderer().render(&test, "", "soc2_alpha").expect("render");

        let line = form
            .body
            .lines()
            .find(|line| line.starts_with("- "))
            .expect("assertion line");
        let item = line.trim_start_matches("- ");
        assert_eq!(item.chars().count(), 2048 + ELLIPSIS.len());
        assert!(item.ends_with(ELLIPSIS));
    }

    #[test]
    fn body_is_capped_after_assembly() {
        let mut test = sample_test();
        test.assertions = (0..50).map(|i| failing(&format!("{i}{}", "b".repeat(3000)))).collect();
        let form = renderer().render(&test, "", "soc2_alpha").expect("render");

        assert!(form.body.chars().count() <= 32768 + ELLIPSIS.len());
        assert!(form.body.ends_with(ELLIPSIS));
        assert_eq!(extract_test_id(&form.body), Some("t1"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 5), "short");
    }

    #[test]
    fn html_fields_become_markdown() {
        let md = to_markdown("<p>Turn on <strong>MFA</strong></p>");
        assert!(md.contains("**MFA**"), "got {md:?}");
        assert!(!md.contains("<strong>"));
    }

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(to_markdown("  keep_me *as is*  "), "keep_me *as is*");
    }

    #[test]
    fn angle_brackets_without_tags_stay_plain() {
        assert_eq!(to_markdown("a<b and c>d"), "a<b and c>d");
        assert_eq!(to_markdown("x < y && y > z; done"), "x < y && y > z; done");
        assert_eq!(to_markdown("<owner>/<repo>"), "<owner>/<repo>");
    }

    #[test]
    fn closing_tags_void_elements_and_entities_are_markup() {
        assert!(looks_like_markup("<p>Encrypt</p>"));
        assert!(looks_like_markup("line one<br>line two"));
        assert!(looks_like_markup("<br/>"));
        assert!(looks_like_markup("Tom &amp; Jerry"));
        assert!(looks_like_markup("&#8217;"));
        assert!(!looks_like_markup("a<b and c>d"));
    }

    #[test]
    fn rejects_ids_the_extractor_cannot_recover() {
        let mut test = sample_test();
        test.id = "has space".to_string();
        assert!(matches!(
            renderer().render(&test, "", "soc2_alpha"),
            Err(RenderError::UnrecoverableId(_))
        ));

        test.id = "t1é".to_string();
        assert!(matches!(
            renderer().render(&test, "", "soc2_alpha"),
            Err(RenderError::UnrecoverableId(_))
        ));

        test.id = String::new();
        assert!(matches!(
            renderer().render(&test, "", "soc2_alpha"),
            Err(RenderError::MissingId)
        ));
    }
}
