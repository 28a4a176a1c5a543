// Property: version generators are pure functions of their inputs
//
// Auto versions end up in public URLs, so identical inputs must produce
// identical versions, and a content edit must produce a different one.

use asset_combiner::resource::ResourceMode;
use asset_combiner::version::{
    HashCodeVersionGenerator, ResourceFactors, Sha512VersionGenerator, VersionGenerator,
    VersionInputs,
};
use proptest::prelude::*;

fn inputs(contents: &[String], debug_enabled: bool, filters: &[String]) -> VersionInputs {
    VersionInputs {
        debug_enabled,
        filters: filters.to_vec(),
        cache_vary_providers: Vec::new(),
        resources: contents
            .iter()
            .map(|content| ResourceFactors {
                content: content.clone(),
                forward_cookie: false,
                mode: ResourceMode::Static,
                minifier: "default:oxc_js()".to_string(),
            })
            .collect(),
    }
}

fn generators() -> [Box<dyn VersionGenerator>; 2] {
    [Box::new(HashCodeVersionGenerator), Box::new(Sha512VersionGenerator)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_identical_inputs_identical_version(
        contents in prop::collection::vec(".{0,64}", 0..6),
        debug_enabled in any::<bool>(),
        filters in prop::collection::vec("[a-z_]{1,12}\\(\\)", 0..3),
    ) {
        for generator in generators() {
            let a = generator.generate(&inputs(&contents, debug_enabled, &filters));
            let b = generator.generate(&inputs(&contents.clone(), debug_enabled, &filters.clone()));
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn prop_content_edit_changes_version(
        contents in prop::collection::vec("[a-z{}:;]{1,32}", 1..6),
        index in any::<prop::sample::Index>(),
        suffix in "[a-z]{1,8}",
    ) {
        let mut edited = contents.clone();
        let i = index.index(edited.len());
        edited[i].push_str(&suffix);

        for generator in generators() {
            let before = generator.generate(&inputs(&contents, false, &[]));
            let after = generator.generate(&inputs(&edited, false, &[]));
            prop_assert_ne!(before, after);
        }
    }

    #[test]
    fn prop_version_is_lowercase_hex(contents in prop::collection::vec(".{0,32}", 0..4)) {
        for generator in generators() {
            let version = generator.generate(&inputs(&contents, false, &[]));
            prop_assert!(!version.is_empty());
            prop_assert!(version.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
