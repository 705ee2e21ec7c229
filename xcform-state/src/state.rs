//! State file structures

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use xcform_core::identity;
use xcform_core::private_state::PrivateState;
use xcform_core::resource::{ResourceInstance, Value};

/// Everything one run tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// Format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identifies one state history; a write from another lineage is refused
    pub lineage: String,
    /// Version of xcform that last wrote the file
    pub xcform_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            xcform_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.xcform_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find(&self, resource_type: &str, id: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.id == id)
    }

    /// Insert or replace the entry with the same type and id
    pub fn upsert(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.id == resource.id)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, resource_type: &str, id: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.id == id)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// One tracked instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource kind without the provider prefix
    pub resource_type: String,
    /// `namespace/name`
    pub id: String,
    pub provider: String,
    pub attributes: HashMap<String, serde_json::Value>,
    /// Private sidecar, opaque to everything but the controller
    #[serde(default, skip_serializing_if = "PrivateState::is_empty")]
    pub private: PrivateState,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            attributes: HashMap::new(),
            private: PrivateState::new(),
        }
    }

    /// Capture an instance; null attributes are not stored
    pub fn from_instance(
        provider: impl Into<String>,
        instance: &ResourceInstance,
        private: PrivateState,
    ) -> Self {
        let id = instance
            .id()
            .map(str::to_string)
            .or_else(|| Some(identity::encode(instance.namespace()?, instance.name()?)))
            .unwrap_or_default();
        let attributes = instance
            .attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Self {
            resource_type: instance.resource_type.clone(),
            id,
            provider: provider.into(),
            attributes,
            private,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn to_instance(&self) -> ResourceInstance {
        let mut instance = ResourceInstance::new(&self.resource_type);
        for (key, value) in &self.attributes {
            instance.set(key.clone(), Value::from_json(value));
        }
        instance
    }

    /// Display address in the form `type.namespace/name`
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ResourceInstance {
        ResourceInstance::new("healthcheck")
            .with_attribute("name", "hc")
            .with_attribute("namespace", "shared")
            .with_attribute("id", "shared/hc")
            .with_attribute("timeout", 3i64)
            .with_attribute("labels", Value::string_map([("team", "x")]))
            .with_attribute("description", Value::Null)
    }

    #[test]
    fn new_state_is_empty() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn serial_increments() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn upsert_replaces_same_identity() {
        let mut state = StateFile::new();
        state.upsert(ResourceState::new("healthcheck", "shared/hc", "f5xc"));
        state.upsert(
            ResourceState::new("healthcheck", "shared/hc", "f5xc")
                .with_attribute("timeout", serde_json::json!(5)),
        );
        state.upsert(ResourceState::new("origin_pool", "shared/hc", "f5xc"));

        assert_eq!(state.resources.len(), 2);
        assert_eq!(
            state.find("healthcheck", "shared/hc").unwrap().attributes["timeout"],
            serde_json::json!(5)
        );
    }

    #[test]
    fn remove_returns_entry() {
        let mut state = StateFile::new();
        state.upsert(ResourceState::new("healthcheck", "shared/hc", "f5xc"));
        assert!(state.remove("healthcheck", "shared/hc").is_some());
        assert!(state.remove("healthcheck", "shared/hc").is_none());
    }

    #[test]
    fn instance_conversion_drops_nulls() {
        let mut private = PrivateState::new();
        private.set_key("api_metadata", r#"{"uid":"u-1"}"#);
        let resource = ResourceState::from_instance("f5xc", &instance(), private.clone());

        assert_eq!(resource.id, "shared/hc");
        assert_eq!(resource.address(), "healthcheck.shared/hc");
        assert!(!resource.attributes.contains_key("description"));
        assert_eq!(resource.private, private);

        let restored = resource.to_instance();
        assert_eq!(restored.get("timeout"), &Value::Int(3));
        assert_eq!(restored.labels(), instance().labels());
        assert_eq!(restored.id(), Some("shared/hc"));
    }

    #[test]
    fn id_is_derived_when_missing() {
        let instance = ResourceInstance::new("healthcheck")
            .with_attribute("name", "hc")
            .with_attribute("namespace", "shared");
        let resource = ResourceState::from_instance("f5xc", &instance, PrivateState::new());
        assert_eq!(resource.id, "shared/hc");
    }

    #[test]
    fn private_sidecar_survives_serialization() {
        let mut state = StateFile::new();
        let mut private = PrivateState::new();
        private.set_key("api_metadata", r#"{"uid":"u-1"}"#);
        state.upsert(ResourceState::from_instance("f5xc", &instance(), private));
        state.upsert(ResourceState::new("known_label", "shared/kl", "f5xc"));

        let json = serde_json::to_string_pretty(&state).unwrap();
        let restored: StateFile = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.lineage, state.lineage);
        assert_eq!(
            restored
                .find("healthcheck", "shared/hc")
                .unwrap()
                .private
                .get_key("api_metadata"),
            Some(r#"{"uid":"u-1"}"#)
        );
        assert!(restored.find("known_label", "shared/kl").unwrap().private.is_empty());
    }
}
