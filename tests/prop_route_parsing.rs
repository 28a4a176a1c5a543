// Property: request paths below the installation map back to set and version
//
// Any URL the settings would generate, with or without a trailing slash and
// with any number of vary keys, routes to the set and version it names.

use asset_combiner::pipeline::Route;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_generated_urls_route_back(
        installation in "(/[a-z]{1,8}){0,3}",
        set in "[A-Za-z][A-Za-z0-9_]{0,15}",
        version in "[0-9a-f]{1,16}",
        keys in prop::collection::vec("[a-zA-Z-]{1,8}", 0..3),
        trailing in any::<bool>(),
    ) {
        let mut path = format!("{}/{}/{}/{}", installation, set, version, keys.join("/"));
        if !trailing {
            path = path.trim_end_matches('/').to_string();
        }

        let route = Route::parse(&installation, &path);
        prop_assert_eq!(route, Some(Route::Asset { set, version }));
    }

    #[test]
    fn prop_foreign_prefix_is_rejected(
        installation in "/[a-z]{1,8}",
        other in "/[A-Z]{1,8}",
        rest in "(/[a-z0-9]{1,8}){0,3}",
    ) {
        let path = format!("{}{}", other, rest);
        prop_assert_eq!(Route::parse(&installation, &path), None);
    }
}
