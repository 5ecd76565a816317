//! Label taxonomy and the label synchronizer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tracker::Tracker;

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("failed to look up label {name:?}: {source:#}")]
    Lookup {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create label {name:?}: {source:#}")]
    Create {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Names of the fixed labels sfsync owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelTaxonomy {
    /// Marks an issue as managed by sfsync. Only issues carrying it are listed.
    pub sync: String,
    /// Appended when an issue is closed because its test was disabled or removed.
    pub disabled: String,
    /// Appended when an issue is closed because its test passes.
    pub passing: String,
    /// Description given to labels sfsync creates.
    pub description: String,
}

impl Default for LabelTaxonomy {
    fn default() -> Self {
        Self {
            sync: "sframe".to_string(),
            disabled: "disabled".to_string(),
            passing: "passing".to_string(),
            description: "Added by sfsync".to_string(),
        }
    }
}

impl LabelTaxonomy {
    /// Every label a run may apply, in a stable order without duplicates.
    #[must_use]
    pub fn required(&self, report_keys: &[String], extra: &str) -> Vec<String> {
        let fixed = [self.sync.as_str(), self.disabled.as_str(), self.passing.as_str()];
        let reports = report_keys.iter().map(|key| report_label(key));

        let mut labels: Vec<String> = Vec::new();
        for label in fixed.into_iter().chain(reports).chain([extra]) {
            let label = label.trim();
            if !label.is_empty() && !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
        labels
    }
}

/// Taxonomy label for a report key: the text before the first `_`.
///
/// `soc2_alpha` becomes `soc2`; keys without `_` are used whole.
#[must_use]
pub fn report_label(report_key: &str) -> &str {
    report_key
        .split_once('_')
        .map_or(report_key, |(prefix, _)| prefix)
}

/// Make sure every label in `labels` exists on the tracker.
///
/// Returns the labels that were missing. In dry-run mode they are reported
/// but not created. Existing labels are never modified.
///
/// # Errors
///
/// Any failed lookup or creation aborts with [`LabelError`].
pub fn ensure_labels(
    tracker: &dyn Tracker,
    description: &str,
    labels: &[String],
    dry_run: bool,
) -> Result<Vec<String>, LabelError> {
    let mut missing = Vec::new();

    for name in labels {
        let existing = tracker.get_label(name).map_err(|source| LabelError::Lookup {
            name: name.clone(),
            source,
        })?;

        if existing.is_some() {
            debug!(label = %name, "label exists");
            continue;
        }

        if dry_run {
            info!(label = %name, "[dry-run] would create label");
        } else {
            tracker
                .create_label(name, description)
                .map_err(|source| LabelError::Create {
                    name: name.clone(),
                    source,
                })?;
            info!(label = %name, "created label");
        }
        missing.push(name.clone());
    }

    Ok(missing)
}
