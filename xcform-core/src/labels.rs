//! Labels - Filtering of platform-injected label and annotation keys

use std::collections::HashMap;

/// Key prefix reserved by the platform for system-managed metadata
pub const SYSTEM_LABEL_PREFIX: &str = "ves.io/";

pub fn is_system_key(key: &str) -> bool {
    key.starts_with(SYSTEM_LABEL_PREFIX)
}

/// Remove every system-reserved key from a label or annotation map
pub fn filter_system_keys(raw: &HashMap<String, String>) -> HashMap<String, String> {
    raw.iter()
        .filter(|(k, _)| !is_system_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn removes_system_keys() {
        let raw = map(&[
            ("team", "x"),
            ("ves.io/app_type", "default"),
            ("ves.io/siteName", "ce01"),
        ]);
        assert_eq!(filter_system_keys(&raw), map(&[("team", "x")]));
    }

    #[test]
    fn keeps_lookalike_keys() {
        let raw = map(&[("ves.io", "a"), ("my.ves.io/key", "b"), ("VES.IO/key", "c")]);
        assert_eq!(filter_system_keys(&raw), raw);
    }

    #[test]
    fn empty_map_stays_empty() {
        assert!(filter_system_keys(&HashMap::new()).is_empty());
    }

    proptest! {
        #[test]
        fn filter_is_idempotent(
            entries in prop::collection::hash_map("(ves\\.io/)?[a-z]{1,8}", "[a-z0-9]{0,8}", 0..12)
        ) {
            let once = filter_system_keys(&entries);
            let twice = filter_system_keys(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.keys().all(|k| !is_system_key(k)));
        }
    }
}
