use proptest::prelude::*;
use witsync_core::path::{PathRemapper, remap_root};

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 _.-]{1,12}".prop_map(|s| s.trim().to_string())
        .prop_filter("non-empty segment", |s| !s.is_empty())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(2000))]

    // Any input at all, including separators only and unicode.
    #[test]
    fn remap_is_total_and_rooted(
        path in proptest::option::of(".{0,64}"),
        source_root in segment(),
        target_root in segment(),
    ) {
        let out = remap_root(path.as_deref(), &source_root, &target_root);
        prop_assert!(out.starts_with(&target_root));
    }

    #[test]
    fn tail_segments_are_preserved(
        source_root in segment(),
        target_root in segment(),
        tail in proptest::collection::vec(segment(), 0..5),
        slash in any::<bool>(),
    ) {
        let sep = if slash { "/" } else { "\\" };
        let mut parts = vec![source_root.clone()];
        parts.extend(tail.iter().cloned());
        let out = remap_root(Some(&parts.join(sep)), &source_root, &target_root);

        let mut expected = vec![target_root.clone()];
        expected.extend(tail);
        prop_assert_eq!(out, expected.join("\\"));
    }

    #[test]
    fn foreign_roots_are_nested_not_dropped(
        first in segment(),
        target_root in segment(),
        tail in proptest::collection::vec(segment(), 0..4),
    ) {
        prop_assume!(!first.eq_ignore_ascii_case("SrcProj"));
        let mut parts = vec![first.clone()];
        parts.extend(tail.iter().cloned());
        let out = remap_root(Some(&parts.join("\\")), "SrcProj", &target_root);
        prop_assert_eq!(out, format!("{target_root}\\{}", parts.join("\\")));
    }

    #[test]
    fn force_root_ignores_the_source_path(path in ".{0,32}") {
        let paths = PathRemapper::new("SrcProj", r"TgtProj\Area", r"TgtProj\Iter").with_force_root(true);
        prop_assert_eq!(paths.area(Some(&path)), r"TgtProj\Area");
        prop_assert_eq!(paths.iteration(Some(&path)), r"TgtProj\Iter");
    }
}
