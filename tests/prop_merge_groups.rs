// Property: merge groups are the maximal runs of one minifier
//
// Concatenating the groups gives back the resources in declaration order,
// every group uses a single minifier, and neighbouring groups differ.

use asset_combiner::plugins::binder::SimpleObjectBinder;
use asset_combiner::plugins::minifier::MinifierInfo;
use asset_combiner::plugins::PluginRegistry;
use asset_combiner::resource::{Resource, ResourceMode};
use asset_combiner::workflow::merge_groups;
use proptest::prelude::*;
use std::sync::Arc;

fn minifiers() -> Vec<Arc<MinifierInfo>> {
    let ctor = PluginRegistry::with_builtins().minifier("null").unwrap();
    ["a", "b", "c"]
        .iter()
        .map(|name| {
            Arc::new(MinifierInfo::new(
                *name,
                "null",
                Vec::new(),
                Arc::new(SimpleObjectBinder),
                ctor.clone(),
            ))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_groups_are_maximal_runs(choices in prop::collection::vec(0usize..3, 0..24)) {
        let minifiers = minifiers();
        let resources: Vec<Resource> = choices
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                Resource::new(format!("~/r{}.js", i), ResourceMode::Static, false, minifiers[m].clone())
                    .unwrap()
            })
            .collect();

        let groups = merge_groups(&resources);

        let flattened: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.resources.iter().map(|r| r.path()))
            .collect();
        let declared: Vec<&str> = resources.iter().map(|r| r.path()).collect();
        prop_assert_eq!(flattened, declared);

        for group in &groups {
            prop_assert!(!group.resources.is_empty());
            for resource in group.resources {
                prop_assert_eq!(resource.minifier().name(), group.minifier.name());
            }
        }
        for pair in groups.windows(2) {
            prop_assert_ne!(pair[0].minifier.name(), pair[1].minifier.name());
        }

        let runs = choices.windows(2).filter(|w| w[0] != w[1]).count()
            + usize::from(!choices.is_empty());
        prop_assert_eq!(groups.len(), runs);
    }
}
