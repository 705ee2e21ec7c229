//! Envelope - The generic `{metadata, spec}` wire shape shared by all kinds

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// User-settable object metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Server-generated metadata, never sent by the client
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Request and response body of every CRUD call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: ObjectMetadata,
    #[serde(default)]
    pub spec: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_metadata: Option<SystemMetadata>,
}

impl Envelope {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMetadata {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: serde_json::Map::new(),
            system_metadata: None,
        }
    }

    pub fn with_spec_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.spec.insert(key.into(), value);
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.metadata.labels = Some(labels);
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.metadata.uid = Some(uid.into());
        self
    }

    /// Server-assigned UID from `metadata`, falling back to `system_metadata`
    pub fn uid(&self) -> Option<&str> {
        self.metadata
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .or_else(|| self.system_metadata.as_ref()?.uid.as_deref())
            .filter(|uid| !uid.is_empty())
    }

    pub fn modification_timestamp(&self) -> Option<&str> {
        self.system_metadata
            .as_ref()?
            .modification_timestamp
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_omitted_on_the_wire() {
        let envelope = Envelope::new("ns1", "foo");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "metadata": {"name": "foo", "namespace": "ns1"},
                "spec": {}
            })
        );
    }

    #[test]
    fn deserialize_response_with_system_metadata() {
        let json = serde_json::json!({
            "metadata": {
                "name": "foo",
                "namespace": "ns1",
                "labels": {"team": "x"}
            },
            "spec": {"timeout": 3},
            "system_metadata": {
                "uid": "u-1",
                "creation_timestamp": "2024-01-01T00:00:00Z",
                "modification_timestamp": "2024-01-02T00:00:00Z",
                "tenant": "acme"
            },
            "status": []
        });
        let envelope: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(envelope.uid(), Some("u-1"));
        assert_eq!(
            envelope.modification_timestamp(),
            Some("2024-01-02T00:00:00Z")
        );
        assert_eq!(envelope.spec.get("timeout"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn metadata_uid_takes_precedence() {
        let mut envelope = Envelope::new("ns1", "foo").with_uid("meta-uid");
        envelope.system_metadata = Some(SystemMetadata {
            uid: Some("system-uid".to_string()),
            ..Default::default()
        });
        assert_eq!(envelope.uid(), Some("meta-uid"));
    }

    #[test]
    fn empty_uid_is_absent() {
        let envelope = Envelope::new("ns1", "foo").with_uid("");
        assert_eq!(envelope.uid(), None);
    }
}
