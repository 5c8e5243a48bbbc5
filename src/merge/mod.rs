//! # Merge Engine
//!
//! Combines the default secret set with an optional override set.
//! Override wins for every key present in both; the merge is pure and
//! covers the union of keys.

use tracing::debug;

use crate::vault::SecretSet;

/// Merge `defaults` into a copy of `overrides`.
///
/// Every override key keeps its value; default keys pass through only
/// when no override key with the same name exists. Overridden keys are
/// logged for audit and never change the output.
pub fn merge(defaults: &SecretSet, overrides: Option<&SecretSet>) -> SecretSet {
    let mut merged = overrides.cloned().unwrap_or_default();

    for (key, value) in defaults {
        if merged.contains_key(key) {
            debug!(key = %key, "overriding default value for key");
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> SecretSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn override_wins_for_shared_keys() {
        let defaults = set(&[("a", "1"), ("b", "2")]);
        let overrides = set(&[("b", "9"), ("c", "3")]);

        let merged = merge(&defaults, Some(&overrides));

        assert_eq!(merged, set(&[("a", "1"), ("b", "9"), ("c", "3")]));
    }

    #[test]
    fn no_override_passes_defaults_through() {
        let defaults = set(&[("a", "1"), ("b", "2")]);

        let merged = merge(&defaults, None);

        assert_eq!(merged, defaults);
    }

    #[test]
    fn empty_defaults_keep_overrides_intact() {
        let overrides = set(&[("x", "7")]);

        let merged = merge(&SecretSet::new(), Some(&overrides));

        assert_eq!(merged, overrides);
    }

    #[test]
    fn merge_covers_union_and_never_clobbers_overrides() {
        let defaults = set(&[("shared", "default"), ("only-default", "d")]);
        let overrides = set(&[("shared", "override"), ("only-override", "o")]);

        let merged = merge(&defaults, Some(&overrides));

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("shared").map(String::as_str), Some("override"));
        assert_eq!(merged.get("only-default").map(String::as_str), Some("d"));
        assert_eq!(merged.get("only-override").map(String::as_str), Some("o"));
    }

    #[test]
    fn merge_is_pure() {
        let defaults = set(&[("a", "1")]);
        let overrides = set(&[("a", "2")]);

        let _merged = merge(&defaults, Some(&overrides));

        assert_eq!(defaults, set(&[("a", "1")]));
        assert_eq!(overrides, set(&[("a", "2")]));
    }
}
