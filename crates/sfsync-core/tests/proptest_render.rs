//! Properties of rendered issues: identity recovery, size caps, labels.

use proptest::prelude::*;
use sfsync_core::config::RenderConfig;
use sfsync_core::identity::extract_test_id;
use sfsync_core::labels::LabelTaxonomy;
use sfsync_core::model::{AssertionResult, Test};
use sfsync_core::render::{ELLIPSIS, Renderer};

fn arb_test() -> impl Strategy<Value = Test> {
    (
        "[A-Za-z0-9_-]{1,40}",
        "[a-z_]{1,20}",
        ".{0,80}",
        "[^<&]{0,400}",
        proptest::collection::vec("[^<&]{0,300}", 0..8),
    )
        .prop_map(|(id, key, title, description, messages)| Test {
            id,
            key,
            title,
            description,
            enabled: true,
            pass: false,
            assertions: messages
                .into_iter()
                .map(|message| AssertionResult {
                    fail_message: Some(message),
                    ..AssertionResult::default()
                })
                .collect(),
            ..Test::default()
        })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn rendered_body_always_yields_the_test_id(test in arb_test(), body_limit in 128usize..2000) {
        let config = RenderConfig {
            body_limit,
            item_limit: 120,
            ..RenderConfig::default()
        };
        let renderer = Renderer::new(&LabelTaxonomy::default(), config);

        let form = renderer.render(&test, "", "soc2_alpha").expect("render");
        prop_assert_eq!(extract_test_id(&form.body), Some(test.id.as_str()));
        prop_assert!(form.body.chars().count() <= body_limit + ELLIPSIS.len());
    }

    #[test]
    fn rendering_is_deterministic(test in arb_test()) {
        let renderer = Renderer::new(&LabelTaxonomy::default(), RenderConfig::default());
        let first = renderer.render(&test, "extra", "iso27001").expect("render");
        let second = renderer.render(&test, "extra", "iso27001").expect("render");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn issue_labels_are_unique_and_ensured(
        report_key in "[a-z0-9]{1,8}(_[a-z]{1,6})?",
        extra in "[a-z ]{0,6}",
        test in arb_test(),
    ) {
        let taxonomy = LabelTaxonomy::default();
        let renderer = Renderer::new(&taxonomy, RenderConfig::default());
        let form = renderer.render(&test, &extra, &report_key).expect("render");

        prop_assert_eq!(form.labels.first().map(String::as_str), Some("sframe"));
        let required = taxonomy.required(std::slice::from_ref(&report_key), &extra);
        for (i, label) in form.labels.iter().enumerate() {
            prop_assert!(!label.is_empty());
            prop_assert!(!form.labels[..i].contains(label), "duplicate {}", label);
            prop_assert!(required.contains(label), "{} was never ensured", label);
        }
    }
}
