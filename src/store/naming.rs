//! Name normalization and collision resolution
//!
//! Every name-bearing entity (store, experiment, dataset) passes through
//! [`normalize`] exactly once, at construction, so case-folding is not
//! scattered across call sites. [`resolve_collision`] implements the suffix
//! rule shared by directory names, dataset names, and visualization artifact
//! filenames.

use crate::{Error, Result};

/// Normalize a user-chosen name at the data-model boundary.
///
/// Names are case-folded to lowercase. Empty names and names containing
/// path separators are rejected, since experiment and dataset names double
/// as on-disk path components.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the name is empty or contains `/`
/// or `\`.
pub fn normalize(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidInput("name must not be empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidInput(format!(
            "name '{name}' must not contain path separators"
        )));
    }
    Ok(name.to_lowercase())
}

/// Derive the next candidate name after a collision.
///
/// If the name ends in a hyphen followed by a single decimal digit, that
/// digit is incremented (`9` rolls over to `10`, widening the suffix);
/// otherwise `-1` is appended.
fn next_candidate(name: &str) -> String {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[bytes.len() - 2] == b'-' && bytes[bytes.len() - 1].is_ascii_digit()
    {
        let digit = (bytes[bytes.len() - 1] - b'0') as u32;
        format!("{}{}", &name[..name.len() - 1], digit + 1)
    } else {
        format!("{name}-1")
    }
}

/// Resolve a desired name against a collision predicate.
///
/// Repeatedly applies the suffix rule until `collides` reports the name
/// free. Terminates for any finite set of existing names: each step either
/// bumps the trailing digit or grows the name, so candidates never repeat.
/// Resolving the same starting name against the same existing set is
/// deterministic.
pub fn resolve_collision<F>(desired: &str, mut collides: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let mut candidate = desired.to_string();
    while collides(&candidate) {
        candidate = next_candidate(&candidate);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalize_case_folds() {
        assert_eq!(normalize("MyExperiment").unwrap(), "myexperiment");
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(normalize("").is_err());
    }

    #[test]
    fn test_normalize_rejects_path_separators() {
        assert!(normalize("a/b").is_err());
        assert!(normalize("a\\b").is_err());
    }

    #[test]
    fn test_resolve_no_collision_keeps_name() {
        let resolved = resolve_collision("traces", |_| false);
        assert_eq!(resolved, "traces");
    }

    #[test]
    fn test_resolve_appends_suffix() {
        let existing: HashSet<&str> = ["traces"].into_iter().collect();
        let resolved = resolve_collision("traces", |c| existing.contains(c));
        assert_eq!(resolved, "traces-1");
    }

    #[test]
    fn test_resolve_increments_digit_suffix() {
        let existing: HashSet<&str> = ["traces", "traces-1", "traces-2"].into_iter().collect();
        let resolved = resolve_collision("traces", |c| existing.contains(c));
        assert_eq!(resolved, "traces-3");
    }

    #[test]
    fn test_resolve_widens_past_nine() {
        let existing: HashSet<String> = std::iter::once("traces".to_string())
            .chain((1..=9).map(|i| format!("traces-{i}")))
            .collect();
        let resolved = resolve_collision("traces", |c| existing.contains(c));
        assert_eq!(resolved, "traces-10");
    }

    #[test]
    fn test_resolve_only_single_digit_suffix_increments() {
        // "-10" is not a single-digit suffix, so the rule appends instead
        let existing: HashSet<&str> = ["traces-10"].into_iter().collect();
        let resolved = resolve_collision("traces-10", |c| existing.contains(c));
        assert_eq!(resolved, "traces-10-1");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: resolution terminates and lands outside the
            /// existing set, for any number of sequential collisions.
            #[test]
            fn prop_resolution_escapes_existing_set(n in 0usize..64) {
                let mut existing: HashSet<String> =
                    std::iter::once("name".to_string()).collect();
                for _ in 0..n {
                    let next = resolve_collision("name", |c| existing.contains(c));
                    prop_assert!(!existing.contains(&next));
                    existing.insert(next);
                }
            }

            /// Property: resolving twice against the same set yields the
            /// same name.
            #[test]
            fn prop_resolution_is_deterministic(
                names in prop::collection::hash_set("[a-z]{1,6}(-[0-9])?", 0..16),
                desired in "[a-z]{1,6}",
            ) {
                let a = resolve_collision(&desired, |c| names.contains(c));
                let b = resolve_collision(&desired, |c| names.contains(c));
                prop_assert_eq!(a, b);
            }
        }
    }
}
