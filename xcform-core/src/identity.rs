//! Identity - Composite `namespace/name` identifier codec
//!
//! The composite identifier is both the import string accepted from users and
//! the computed `id` attribute of every instance. No escaping is applied.

use thiserror::Error;

/// Separator between namespace and name
pub const SEPARATOR: char = '/';

/// Import or state identifier that cannot be split into namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed identifier '{id}': {reason}, expected \"<namespace>/<name>\"")]
pub struct MalformedIdentifier {
    pub id: String,
    pub reason: &'static str,
}

/// Encode `(namespace, name)` as `"namespace/name"`
pub fn encode(namespace: &str, name: &str) -> String {
    format!("{}{}{}", namespace, SEPARATOR, name)
}

/// Decode an identifier into `(namespace, name)`, splitting on the first separator
pub fn decode(id: &str) -> Result<(String, String), MalformedIdentifier> {
    let malformed = |reason| MalformedIdentifier {
        id: id.to_string(),
        reason,
    };

    let (namespace, name) = id
        .split_once(SEPARATOR)
        .ok_or_else(|| malformed("missing separator"))?;

    if namespace.is_empty() {
        return Err(malformed("empty namespace"));
    }
    if name.is_empty() {
        return Err(malformed("empty name"));
    }

    Ok((namespace.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_joins_with_separator() {
        assert_eq!(encode("ns1", "foo"), "ns1/foo");
    }

    #[test]
    fn decode_valid() {
        assert_eq!(
            decode("ns1/foo").unwrap(),
            ("ns1".to_string(), "foo".to_string())
        );
    }

    #[test]
    fn decode_splits_on_first_separator() {
        assert_eq!(
            decode("ns1/foo/bar").unwrap(),
            ("ns1".to_string(), "foo/bar".to_string())
        );
    }

    #[test]
    fn decode_is_case_sensitive() {
        let (ns, name) = decode("Shared/MyPool").unwrap();
        assert_eq!(ns, "Shared");
        assert_eq!(name, "MyPool");
    }

    #[test]
    fn decode_rejects_missing_separator() {
        let err = decode("badformat").unwrap_err();
        assert_eq!(err.reason, "missing separator");
        assert!(err.to_string().contains("badformat"));
    }

    #[test]
    fn decode_rejects_empty_parts() {
        assert_eq!(decode("/foo").unwrap_err().reason, "empty namespace");
        assert_eq!(decode("ns1/").unwrap_err().reason, "empty name");
        assert!(decode("/").is_err());
        assert!(decode("").is_err());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(ns in "[a-z0-9-]{1,20}", name in "[a-zA-Z0-9._-]{1,40}") {
            let (decoded_ns, decoded_name) = decode(&encode(&ns, &name)).unwrap();
            prop_assert_eq!(decoded_ns, ns);
            prop_assert_eq!(decoded_name, name);
        }
    }
}
