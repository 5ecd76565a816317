//! The compliance-test catalog seam.

use std::collections::HashSet;

use anyhow::{Context as _, Result};
use tracing::{debug, info};

use crate::model::{ScopedTest, Test};

/// Read access to the compliance-test catalog.
pub trait Catalog {
    /// Every test belonging to the framework named by `report_key`.
    ///
    /// Listing results may omit assertion detail.
    fn fetch_tests(&self, report_key: &str) -> Result<Vec<Test>>;

    /// One test with its failing assertion results filled in.
    fn fetch_test_detail(&self, id: &str) -> Result<Test>;
}

/// Collect the tests in scope for `report_keys`.
///
/// Tests listed under several keys are kept once, under the first key that
/// listed them. Only enabled, failing tests are re-fetched with detail;
/// everything else is used as listed.
///
/// # Errors
///
/// Propagates the first catalog failure.
pub fn collect(catalog: &dyn Catalog, report_keys: &[String]) -> Result<Vec<ScopedTest>> {
    let mut seen = HashSet::new();
    let mut scoped = Vec::new();

    for report_key in report_keys {
        let tests = catalog
            .fetch_tests(report_key)
            .with_context(|| format!("failed to list tests for {report_key}"))?;
        info!(report_key = %report_key, count = tests.len(), "fetched catalog tests");

        let total = tests.len();
        for (position, test) in tests.into_iter().enumerate() {
            if !seen.insert(test.id.clone()) {
                debug!(test_id = %test.id, report_key = %report_key, "test already collected");
                continue;
            }

            let test = if test.is_actionable() {
                debug!(
                    test_id = %test.id,
                    "[{}/{total}] fetching detail for failing test",
                    position + 1
                );
                catalog
                    .fetch_test_detail(&test.id)
                    .with_context(|| format!("failed to fetch detail for test {}", test.id))?
            } else {
                test
            };

            scoped.push(ScopedTest {
                report_key: report_key.clone(),
                test,
            });
        }
    }

    Ok(scoped)
}
