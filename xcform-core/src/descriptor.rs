//! Descriptor - Static per-kind definitions and the registry that owns them

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ResourceError;
use crate::schema::ResourceSchema;
use crate::timeouts::TimeoutCategory;

/// Placeholder substituted with the namespace in path templates
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// Everything the generic controller needs to know about one resource kind
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Kind name (e.g., "http_loadbalancer")
    pub type_name: String,
    /// Collection path template, e.g. "/api/config/namespaces/{namespace}/http_loadbalancers"
    pub path_template: String,
    pub timeout_category: TimeoutCategory,
    pub schema: ResourceSchema,
}

impl ResourceDescriptor {
    pub fn new(
        type_name: impl Into<String>,
        path_template: impl Into<String>,
        schema: ResourceSchema,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            path_template: path_template.into(),
            timeout_category: TimeoutCategory::Standard,
            schema,
        }
    }

    pub fn with_timeout_category(mut self, category: TimeoutCategory) -> Self {
        self.timeout_category = category;
        self
    }

    /// Collection path for a namespace, used for create
    ///
    /// Path segments are percent-encoded.
    pub fn collection_path(&self, namespace: &str) -> String {
        self.path_template
            .replace(NAMESPACE_PLACEHOLDER, &urlencoding::encode(namespace))
    }

    /// Item path for one object, used for get, update and delete
    pub fn item_path(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/{}",
            self.collection_path(namespace),
            urlencoding::encode(name)
        )
    }
}

/// Registry of descriptors keyed by kind name
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<ResourceDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one for the same kind
    pub fn register(&mut self, descriptor: ResourceDescriptor) {
        self.descriptors
            .insert(descriptor.type_name.clone(), Arc::new(descriptor));
    }

    pub fn with(mut self, descriptor: ResourceDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<ResourceDescriptor>> {
        self.descriptors.get(type_name).cloned()
    }

    /// Look up a descriptor, failing for unregistered kinds
    pub fn require(&self, type_name: &str) -> Result<Arc<ResourceDescriptor>, ResourceError> {
        self.get(type_name)
            .ok_or_else(|| ResourceError::UnknownResourceType(type_name.to_string()))
    }

    /// Registered kind names in sorted order
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthcheck() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "healthcheck",
            "/api/config/namespaces/{namespace}/healthchecks",
            ResourceSchema::with_common_attributes("healthcheck"),
        )
    }

    #[test]
    fn paths_substitute_namespace() {
        let d = healthcheck();
        assert_eq!(
            d.collection_path("ns1"),
            "/api/config/namespaces/ns1/healthchecks"
        );
        assert_eq!(
            d.item_path("ns1", "hc"),
            "/api/config/namespaces/ns1/healthchecks/hc"
        );
    }

    #[test]
    fn paths_encode_segments() {
        let d = healthcheck();
        assert_eq!(
            d.item_path("ns 1", "a b?x=1#frag"),
            "/api/config/namespaces/ns%201/healthchecks/a%20b%3Fx%3D1%23frag"
        );
        assert_eq!(
            d.item_path("ns1", "foo/bar"),
            "/api/config/namespaces/ns1/healthchecks/foo%2Fbar"
        );
    }

    #[test]
    fn registry_lookup() {
        let registry = DescriptorRegistry::new().with(healthcheck());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("healthcheck").is_some());
        assert!(matches!(
            registry.require("nope"),
            Err(ResourceError::UnknownResourceType(name)) if name == "nope"
        ));
    }

    #[test]
    fn default_category_is_standard() {
        assert_eq!(healthcheck().timeout_category, TimeoutCategory::Standard);
        let site = healthcheck().with_timeout_category(TimeoutCategory::LongRunning);
        assert_eq!(site.timeout_category, TimeoutCategory::LongRunning);
    }
}
