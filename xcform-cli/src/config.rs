//! Desired configuration file
//!
//! A JSON document listing resources in apply order:
//!
//! ```json
//! {
//!   "resources": [
//!     {
//!       "type": "healthcheck",
//!       "name": "hc",
//!       "namespace": "shared",
//!       "timeout": 3,
//!       "http_health_check": {"path": "/health"},
//!       "timeouts": {"create": "10m"}
//!     }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use xcform_core::dispatch::ProviderServer;
use xcform_core::identity;
use xcform_core::mapper::json_to_value;
use xcform_core::resource::{ResourceInstance, Value};

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(flatten)]
    attributes: HashMap<String, serde_json::Value>,
}

/// One configured instance, bound to its kind
#[derive(Debug, Clone)]
pub struct Desired {
    /// Kind without provider prefix
    pub kind: String,
    pub instance: ResourceInstance,
}

impl Desired {
    pub fn id(&self) -> String {
        identity::encode(
            self.instance.namespace().unwrap_or_default(),
            self.instance.name().unwrap_or_default(),
        )
    }
}

pub fn load(path: &Path, server: &ProviderServer) -> Result<Vec<Desired>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content, server).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse(content: &str, server: &ProviderServer) -> Result<Vec<Desired>, String> {
    let file: ConfigFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

    let mut seen = HashSet::new();
    let mut desired = Vec::with_capacity(file.resources.len());
    for entry in file.resources {
        let resource = server.resource(&entry.resource_type).map_err(|e| e.to_string())?;
        let kind = resource.descriptor().type_name.clone();
        let schema = resource.schema();

        let mut instance = ResourceInstance::new(&kind);
        for (key, json) in &entry.attributes {
            let value = match schema.get(key) {
                Some(attr) => json_to_value(&attr.attr_type, json),
                None => Value::from_json(json),
            };
            instance.set(key.clone(), value);
        }

        let item = Desired { kind, instance };
        if !seen.insert((item.kind.clone(), item.id())) {
            return Err(format!(
                "{} is declared more than once",
                item.instance.address()
            ));
        }
        desired.push(item);
    }
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use xcform_core::catalog::builtin_registry;
    use xcform_core::mock::MockTransport;

    fn server() -> ProviderServer {
        ProviderServer::new("f5xc", builtin_registry(), Arc::new(MockTransport::new()))
    }

    #[test]
    fn parses_resources_in_order() {
        let content = r#"{
            "resources": [
                {"type": "f5xc_healthcheck", "name": "hc", "namespace": "shared",
                 "timeout": 3, "http_health_check": {"path": "/health"},
                 "timeouts": {"create": "10m"}},
                {"type": "known_label", "name": "kl", "namespace": "shared",
                 "key": "env", "value": "prod"}
            ]
        }"#;

        let desired = parse(content, &server()).unwrap();
        assert_eq!(desired.len(), 2);
        assert_eq!(desired[0].kind, "healthcheck");
        assert_eq!(desired[0].id(), "shared/hc");
        assert_eq!(desired[0].instance.get("timeout"), &Value::Int(3));
        assert_eq!(
            desired[0].instance.get("timeouts"),
            &Value::string_map([("create", "10m")])
        );
        assert_eq!(desired[1].kind, "known_label");
    }

    #[test]
    fn rejects_unknown_type() {
        let content = r#"{"resources": [{"type": "f5xc_nope", "name": "a", "namespace": "b"}]}"#;
        let err = parse(content, &server()).unwrap_err();
        assert!(err.contains("f5xc_nope"));
    }

    #[test]
    fn rejects_duplicates() {
        let content = r#"{"resources": [
            {"type": "healthcheck", "name": "hc", "namespace": "shared"},
            {"type": "f5xc_healthcheck", "name": "hc", "namespace": "shared"}
        ]}"#;
        let err = parse(content, &server()).unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        std::fs::write(&path, r#"{"resources": []}"#).unwrap();
        assert!(load(&path, &server()).unwrap().is_empty());
        assert!(load(&dir.path().join("missing.json"), &server()).is_err());
    }
}
