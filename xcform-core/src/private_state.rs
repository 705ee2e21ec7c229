//! Private state - Hidden per-instance metadata persisted beside the state
//!
//! The store is an opaque string-keyed blob. It is never part of the schema
//! and a missing or corrupt blob only costs drift detection, never
//! correctness: objects are always addressed by namespace and name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Key holding the JSON-encoded [`ApiMetadata`]
pub const KEY_API_METADATA: &str = "api_metadata";
/// Key set by import and consumed by the read that completes it
pub const KEY_IMPORT_MARKER: &str = "is_import";

/// Opaque key/value sidecar of one instance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateState {
    entries: BTreeMap<String, String>,
}

impl PrivateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set_key(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove_key(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized form stored next to the instance state
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.entries).unwrap_or_default()
    }

    /// Decode a stored blob; corrupt data yields an empty store
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        match serde_json::from_slice(bytes) {
            Ok(entries) => Self { entries },
            Err(e) => {
                log::warn!("Ignoring unreadable private state: {}", e);
                Self::default()
            }
        }
    }

    pub fn mark_import(&mut self) {
        self.set_key(KEY_IMPORT_MARKER, "true");
    }

    /// Remove the import marker, returning whether it was set
    pub fn take_import_marker(&mut self) -> bool {
        self.remove_key(KEY_IMPORT_MARKER).as_deref() == Some("true")
    }
}

/// Server metadata that is not part of the schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl ApiMetadata {
    /// Capture the metadata of a response envelope
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let system = envelope.system_metadata.as_ref();
        Self {
            uid: envelope.uid().unwrap_or_default().to_string(),
            modified_at: envelope.modification_timestamp().map(str::to_string),
            created_at: system.and_then(|s| s.creation_timestamp.clone()),
            custom: BTreeMap::new(),
        }
    }

    /// Compare the stored metadata with a fresh response
    pub fn detect_drift(&self, current: &Envelope) -> DriftInfo {
        let mut drift = DriftInfo::default();

        if let Some(uid) = current.uid()
            && !self.uid.is_empty()
            && self.uid != uid
        {
            drift.uid_changed = Some((self.uid.clone(), uid.to_string()));
        }

        let modified = current.modification_timestamp();
        if self.modified_at.is_some() && modified.is_some() && self.modified_at.as_deref() != modified
        {
            drift.modified_externally = true;
        }

        drift
    }
}

/// Result of comparing stored metadata with the remote object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriftInfo {
    /// `(stored, current)` when the object was recreated out of band
    pub uid_changed: Option<(String, String)>,
    /// The object changed since it was last observed
    pub modified_externally: bool,
}

impl DriftInfo {
    pub fn has_drift(&self) -> bool {
        self.uid_changed.is_some() || self.modified_externally
    }

    /// Warnings to surface to the user
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some((stored, current)) = &self.uid_changed {
            warnings.push(format!(
                "Resource drift detected: UID changed from {} to {}, the object was recreated outside of this tool",
                stored, current
            ));
        }
        warnings
    }
}

/// Store API metadata in the sidecar
pub fn save_api_metadata(state: &mut PrivateState, metadata: &ApiMetadata) {
    match serde_json::to_string(metadata) {
        Ok(json) => state.set_key(KEY_API_METADATA, json),
        Err(e) => log::warn!("Failed to encode API metadata: {}", e),
    }
}

/// Load API metadata; missing or corrupt data yields `None`
pub fn load_api_metadata(state: &PrivateState) -> Option<ApiMetadata> {
    let raw = state.get_key(KEY_API_METADATA)?;
    match serde_json::from_str(raw) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            log::warn!("Ignoring unreadable API metadata in private state: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::SystemMetadata;

    fn envelope(uid: &str, modified: &str) -> Envelope {
        let mut envelope = Envelope::new("ns1", "foo");
        envelope.system_metadata = Some(SystemMetadata {
            uid: Some(uid.to_string()),
            modification_timestamp: Some(modified.to_string()),
            ..Default::default()
        });
        envelope
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut state = PrivateState::new();
        let metadata = ApiMetadata {
            uid: "u-1".to_string(),
            ..Default::default()
        };
        save_api_metadata(&mut state, &metadata);

        let restored = PrivateState::from_bytes(&state.to_bytes());
        assert_eq!(load_api_metadata(&restored), Some(metadata));
    }

    #[test]
    fn wire_format_is_flat_string_map() {
        let mut state = PrivateState::new();
        save_api_metadata(
            &mut state,
            &ApiMetadata {
                uid: "u-1".to_string(),
                ..Default::default()
            },
        );
        let json: serde_json::Value = serde_json::from_slice(&state.to_bytes()).unwrap();
        assert_eq!(json, serde_json::json!({"api_metadata": "{\"uid\":\"u-1\"}"}));
    }

    #[test]
    fn corrupt_blob_is_non_fatal() {
        let state = PrivateState::from_bytes(b"{not json");
        assert!(state.is_empty());
        assert!(PrivateState::from_bytes(b"").is_empty());

        let mut state = PrivateState::new();
        state.set_key(KEY_API_METADATA, "garbage");
        assert_eq!(load_api_metadata(&state), None);
        assert_eq!(load_api_metadata(&PrivateState::new()), None);
    }

    #[test]
    fn import_marker_is_consumed() {
        let mut state = PrivateState::new();
        state.mark_import();
        assert!(state.take_import_marker());
        assert!(!state.take_import_marker());
    }

    #[test]
    fn detect_uid_change() {
        let stored = ApiMetadata::from_envelope(&envelope("u-1", "t1"));
        assert_eq!(stored.uid, "u-1");

        assert!(!stored.detect_drift(&envelope("u-1", "t1")).has_drift());

        let drift = stored.detect_drift(&envelope("u-2", "t2"));
        assert_eq!(drift.uid_changed, Some(("u-1".to_string(), "u-2".to_string())));
        assert!(drift.modified_externally);
        assert_eq!(drift.warnings().len(), 1);
    }

    #[test]
    fn modification_alone_is_not_a_warning() {
        let stored = ApiMetadata::from_envelope(&envelope("u-1", "t1"));
        let drift = stored.detect_drift(&envelope("u-1", "t2"));
        assert!(drift.has_drift());
        assert!(drift.warnings().is_empty());
    }
}
