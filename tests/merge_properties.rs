// tests/merge_properties.rs

//! Property tests for service registration merging and token substitution.

use distkit::filter::substitute_tokens;
use distkit::{merge, SourceEntry, SourceOrigin};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

const SERVICE: &str = "META-INF/services/com.acme.Spi";

fn provider() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_.$]{0,12}"
}

/// A registration file line: provider, comment, or blank
fn line() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => provider(),
        1 => "#[ -~]{0,10}",
        1 => "[ \t]{0,3}",
        1 => (provider(), "[ -~]{0,8}").prop_map(|(p, c)| format!("  {} # {}", p, c)),
    ]
}

fn entries(files: &[Vec<String>]) -> Vec<distkit::Result<SourceEntry>> {
    files
        .iter()
        .enumerate()
        .map(|(i, lines)| {
            let origin = if i == 0 {
                SourceOrigin::PrimaryOutput
            } else {
                SourceOrigin::Dependency
            };
            Ok(SourceEntry::from_bytes(SERVICE, origin, lines.join("\n").into_bytes()))
        })
        .collect()
}

proptest! {
    #[test]
    fn merged_providers_are_first_seen_and_unique(
        files in prop::collection::vec(prop::collection::vec(provider(), 0..8), 1..6)
    ) {
        let outcome = merge(entries(&files)).unwrap();
        let merged: Vec<&str> = outcome.table.providers(SERVICE).unwrap().iter().collect();

        let mut seen = HashSet::new();
        let expected: Vec<&str> = files
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn comments_and_blank_lines_never_reach_output(
        files in prop::collection::vec(prop::collection::vec(line(), 0..10), 1..4)
    ) {
        let outcome = merge(entries(&files)).unwrap();
        let rendered = outcome.table.render(SERVICE).unwrap();
        for out in rendered.lines() {
            prop_assert!(!out.trim().is_empty());
            prop_assert!(!out.contains('#'));
            prop_assert_eq!(out, out.trim());
        }
    }

    #[test]
    fn text_without_tokens_is_unchanged(text in "[^$]{0,64}") {
        let tokens: BTreeMap<String, String> =
            [("installDir".to_string(), "/opt/app".to_string())].into_iter().collect();
        let (out, replaced) = substitute_tokens(&text, &tokens);
        prop_assert_eq!(out, text);
        prop_assert_eq!(replaced, 0);
    }
}
