//! Schema - Typed attribute definitions for resource kinds
//!
//! Each resource kind declares its attributes once. The schema drives
//! validation, the envelope mapping, and plan-time change classification.

use std::collections::HashMap;
use std::fmt;

use crate::resource::{
    ATTR_ANNOTATIONS, ATTR_DESCRIPTION, ATTR_DISABLE, ATTR_ID, ATTR_LABELS, ATTR_NAME,
    ATTR_NAMESPACE, Value,
};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attributes
    Block(HashMap<String, AttributeSchema>),
    /// Base type narrowed by a validation function
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
}

impl AttributeType {
    pub fn string_map() -> Self {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    pub fn enumeration(variants: &[&str]) -> Self {
        AttributeType::Enum(variants.iter().map(|v| v.to_string()).collect())
    }

    pub fn block(attributes: impl IntoIterator<Item = AttributeSchema>) -> Self {
        AttributeType::Block(
            attributes
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
        )
    }

    /// Underlying wire type, looking through `Custom`
    pub fn base(&self) -> &AttributeType {
        match self {
            AttributeType::Custom { base, .. } => base.base(),
            other => other,
        }
    }

    /// Check if a value conforms to this type
    ///
    /// `Null` conforms to every type; presence is checked separately.
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|message| TypeError::ValidationFailed { message })
            }

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(attributes), Value::Map(map)) => {
                let errors = validate_attributes(attributes, map);
                match errors.into_iter().next() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
            AttributeType::Custom { name, .. } => name.clone(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attributes '{first}' and '{second}' cannot both be set")]
    Conflicting { first: String, second: String },

    #[error("In '{name}': {inner}")]
    NestedError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Who supplies an attribute's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMode {
    /// Must be set in configuration
    Required,
    /// May be set in configuration
    Optional,
    /// Always derived from the remote object, never configured
    Computed,
    /// May be configured, otherwise filled in by the remote object
    OptionalComputed,
}

/// Where an attribute lives in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Metadata,
    Spec,
    /// Derived locally (e.g., the composite `id`)
    Derived,
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub mode: AttributeMode,
    pub location: Location,
    /// A change forces destroy-then-recreate instead of an in-place update
    pub requires_replace: bool,
    /// Value reported when the remote object returns the type's zero value
    pub zero_default: Option<Value>,
    pub description: Option<String>,
    /// Field name in the envelope when it differs from the attribute name
    pub wire_name: Option<String>,
    /// Attributes that may not be set together with this one
    pub conflicts_with: Vec<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            mode: AttributeMode::Optional,
            location: Location::Spec,
            requires_replace: false,
            zero_default: None,
            description: None,
            wire_name: None,
            conflicts_with: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = AttributeMode::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.mode = AttributeMode::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.mode = AttributeMode::OptionalComputed;
        self
    }

    pub fn requires_replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }

    pub fn in_metadata(mut self) -> Self {
        self.location = Location::Metadata;
        self
    }

    pub fn derived(mut self) -> Self {
        self.location = Location::Derived;
        self
    }

    pub fn with_zero_default(mut self, value: impl Into<Value>) -> Self {
        self.zero_default = Some(value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_wire_name(mut self, name: impl Into<String>) -> Self {
        self.wire_name = Some(name.into());
        self
    }

    pub fn conflicts_with(mut self, other: impl Into<String>) -> Self {
        self.conflicts_with.push(other.into());
        self
    }

    /// Field name used in the envelope
    pub fn wire_name(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_computed_only(&self) -> bool {
        self.mode == AttributeMode::Computed
    }

    pub fn is_computed(&self) -> bool {
        matches!(
            self.mode,
            AttributeMode::Computed | AttributeMode::OptionalComputed
        )
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    /// Schema pre-populated with the metadata attributes every kind shares
    pub fn with_common_attributes(resource_type: impl Into<String>) -> Self {
        common_attributes()
            .into_iter()
            .fold(Self::new(resource_type), |schema, attr| schema.attribute(attr))
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Attribute names in stable order
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let errors = validate_attributes(&self.attributes, attributes);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validate_attributes(
    schemas: &HashMap<String, AttributeSchema>,
    attributes: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let is_set = |name: &str| attributes.get(name).is_some_and(|v| !v.is_null());
    let mut errors = Vec::new();

    // Check required attributes
    let mut names: Vec<&String> = schemas.keys().collect();
    names.sort_unstable();
    for name in names {
        let schema = &schemas[name];
        if schema.mode == AttributeMode::Required && !is_set(name) {
            errors.push(TypeError::MissingRequired { name: name.clone() });
        }
        if is_set(name) {
            for other in &schema.conflicts_with {
                // Report each conflicting pair once
                let reported_by_other = other < name
                    && schemas
                        .get(other)
                        .is_some_and(|s| s.conflicts_with.contains(name));
                if is_set(other) && !reported_by_other {
                    errors.push(TypeError::Conflicting {
                        first: name.clone(),
                        second: other.clone(),
                    });
                }
            }
        }
    }

    // Type check each attribute
    for (name, value) in attributes {
        if let Some(schema) = schemas.get(name)
            && let Err(e) = schema.attr_type.validate(value)
        {
            errors.push(TypeError::NestedError {
                name: name.clone(),
                inner: Box::new(e),
            });
        }
        // Unknown attributes are allowed (for flexibility)
    }

    errors
}

/// Attributes every resource kind carries in its metadata
pub fn common_attributes() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new(ATTR_NAME, types::name())
            .required()
            .requires_replace()
            .in_metadata()
            .with_description("Name of the object, unique within its namespace"),
        AttributeSchema::new(ATTR_NAMESPACE, types::namespace())
            .required()
            .requires_replace()
            .in_metadata()
            .with_description("Namespace the object belongs to"),
        AttributeSchema::new(ATTR_DESCRIPTION, AttributeType::String)
            .in_metadata()
            .with_description("Human readable description"),
        AttributeSchema::new(ATTR_LABELS, types::labels())
            .in_metadata()
            .with_description("Labels to attach to the object"),
        AttributeSchema::new(ATTR_ANNOTATIONS, AttributeType::string_map())
            .in_metadata()
            .with_description("Unstructured key/value metadata"),
        AttributeSchema::new(ATTR_DISABLE, AttributeType::Bool)
            .in_metadata()
            .with_description("Administratively disable the object"),
        AttributeSchema::new(ATTR_ID, AttributeType::String)
            .computed()
            .derived()
            .with_description("Identifier in the form namespace/name"),
    ]
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Object name: lowercase alphanumerics and hyphens, starting with a letter
    pub fn name() -> AttributeType {
        AttributeType::Custom {
            name: "Name".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_name(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Namespace: `system` or a name-like identifier of at least two characters
    pub fn namespace() -> AttributeType {
        AttributeType::Custom {
            name: "Namespace".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_namespace(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// String map whose keys are label keys
    pub fn labels() -> AttributeType {
        AttributeType::Custom {
            name: "Labels".to_string(),
            base: Box::new(AttributeType::string_map()),
            validate: |value| match value {
                Value::Map(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort_unstable();
                    keys.into_iter().try_for_each(|k| validate_label_key(k))
                }
                _ => Err("Expected map".to_string()),
            },
        }
    }

    /// TCP/UDP port (1-65535)
    pub fn port() -> AttributeType {
        AttributeType::Custom {
            name: "Port".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) => validate_port(*n),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Domain name, optionally a `*.` wildcard
    pub fn domain() -> AttributeType {
        AttributeType::Custom {
            name: "Domain".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_domain(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

/// Lowercase letter first, no trailing hyphen
fn is_name_like(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_lowercase())
        && !s.ends_with('-')
        && s.chars().all(is_name_char)
}

/// Validate an object name (1-64 characters)
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err(format!(
            "Name must be between 1 and 64 characters, got {}",
            name.len()
        ));
    }
    if !is_name_like(name) {
        return Err(format!(
            "Name '{}' must start with a lowercase letter, contain only lowercase letters, numbers and hyphens, and not end with a hyphen",
            name
        ));
    }
    Ok(())
}

/// Validate a namespace: `system` or 2-64 name characters
pub fn validate_namespace(namespace: &str) -> Result<(), String> {
    if namespace == "system" || ((2..=64).contains(&namespace.len()) && is_name_like(namespace))
    {
        return Ok(());
    }
    Err(format!(
        "Namespace '{}' must be 'system' or start with a lowercase letter and contain only lowercase letters, numbers and hyphens",
        namespace
    ))
}

/// One segment of a label key: alphanumeric at both ends, `-_.` inside
fn is_label_segment(s: &str) -> bool {
    let edge = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    edge(s.chars().next())
        && edge(s.chars().last())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Validate a Kubernetes-style label key (`[prefix/]name`, at most 253 characters)
pub fn validate_label_key(key: &str) -> Result<(), String> {
    if key.len() > 253 {
        return Err(format!(
            "Label key must be at most 253 characters, got {}",
            key.len()
        ));
    }
    let valid = match key.split_once('/') {
        Some((prefix, name)) => is_label_segment(prefix) && is_label_segment(name),
        None => is_label_segment(key),
    };
    if valid {
        Ok(())
    } else {
        Err(format!(
            "Label key '{}' must follow Kubernetes naming conventions",
            key
        ))
    }
}

/// Validate a port number
pub fn validate_port(port: i64) -> Result<(), String> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(format!("Port must be between 1 and 65535, got {}", port))
    }
}

/// Validate a domain name such as `example.com` or `*.example.com`
pub fn validate_domain(domain: &str) -> Result<(), String> {
    let host = domain.strip_prefix("*.").unwrap_or(domain);
    let valid_label = |label: &str| {
        (1..=63).contains(&label.len())
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !host.is_empty() && host.split('.').all(valid_label) {
        Ok(())
    } else {
        Err(format!(
            "Domain '{}' is not a valid domain name, use a form like 'example.com' or '*.example.com'",
            domain
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Null).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::enumeration(&["STANDARD", "ADVANCED"]);
        assert!(t.validate(&Value::from("STANDARD")).is_ok());
        assert!(t.validate(&Value::from("BASIC")).is_err());
    }

    #[test]
    fn validate_block_type() {
        let t = AttributeType::block([
            AttributeSchema::new("port", AttributeType::Int).required(),
            AttributeSchema::new("path", AttributeType::String),
        ]);

        let mut ok = HashMap::new();
        ok.insert("port".to_string(), Value::Int(80));
        assert!(t.validate(&Value::Map(ok)).is_ok());

        let mut missing = HashMap::new();
        missing.insert("path".to_string(), Value::from("/health"));
        assert!(matches!(
            t.validate(&Value::Map(missing)),
            Err(TypeError::MissingRequired { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::with_common_attributes("healthcheck")
            .attribute(AttributeSchema::new("timeout", AttributeType::Int));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("hc"));
        attrs.insert("namespace".to_string(), Value::from("ns1"));
        attrs.insert("timeout".to_string(), Value::Int(3));
        attrs.insert("labels".to_string(), Value::string_map([("a", "b")]));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::with_common_attributes("healthcheck");

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("hc"));
        attrs.insert("namespace".to_string(), Value::Null);

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("namespace"));
    }

    #[test]
    fn conflicting_attributes_reported_once() {
        let schema = ResourceSchema::new("origin_pool")
            .attribute(AttributeSchema::new("use_tls", AttributeType::Bool).conflicts_with("no_tls"))
            .attribute(AttributeSchema::new("no_tls", AttributeType::Bool).conflicts_with("use_tls"));

        let mut attrs = HashMap::new();
        attrs.insert("use_tls".to_string(), Value::Bool(true));
        attrs.insert("no_tls".to_string(), Value::Bool(true));

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TypeError::Conflicting { .. }));

        attrs.insert("no_tls".to_string(), Value::Null);
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn common_attributes_classification() {
        let schema = ResourceSchema::with_common_attributes("healthcheck");
        let name = schema.get("name").unwrap();
        assert!(name.requires_replace);
        assert_eq!(name.location, Location::Metadata);

        let id = schema.get("id").unwrap();
        assert!(id.is_computed_only());
        assert_eq!(id.location, Location::Derived);

        assert!(!schema.get("labels").unwrap().requires_replace);
    }

    #[test]
    fn name_validation() {
        for ok in ["a", "hc", "my-pool-01"] {
            assert!(validate_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "Bad Name?x", "1abc", "pool-", "under_score", &"a".repeat(65)] {
            assert!(validate_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn namespace_validation() {
        for ok in ["system", "ns1", "shared", "my-app"] {
            assert!(validate_namespace(ok).is_ok(), "{ok}");
        }
        for bad in ["", "a", "NS 1", "ns-", "ns_1"] {
            assert!(validate_namespace(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn label_key_validation() {
        for ok in ["team", "app.kubernetes.io/name", "ves.io/app_type", "a"] {
            assert!(validate_label_key(ok).is_ok(), "{ok}");
        }
        for bad in ["", "-team", "team-", "a/b/c", "/name", "has space", &"k".repeat(254)] {
            assert!(validate_label_key(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn port_and_domain_validation() {
        assert!(validate_port(1).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(0).is_err());
        assert!(validate_port(65536).is_err());

        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("*.a.example.com").is_ok());
        assert!(validate_domain("bad domain.com").is_err());
        assert!(validate_domain("-bad.com").is_err());
        assert!(validate_domain("").is_err());
    }

    #[test]
    fn custom_type_checks_base_then_rule() {
        let t = types::port();
        assert!(t.validate(&Value::Int(443)).is_ok());
        assert!(t.validate(&Value::Null).is_ok());
        assert!(matches!(
            t.validate(&Value::Int(0)),
            Err(TypeError::ValidationFailed { .. })
        ));
        assert!(matches!(
            t.validate(&Value::from("443")),
            Err(TypeError::TypeMismatch { .. })
        ));
        assert_eq!(t.to_string(), "Port");
        assert!(matches!(t.base(), AttributeType::Int));
    }

    #[test]
    fn common_attributes_reject_malformed_identity() {
        let schema = ResourceSchema::with_common_attributes("healthcheck");

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("Bad Name?x"));
        attrs.insert("namespace".to_string(), Value::from("NS 1"));
        attrs.insert(
            "labels".to_string(),
            Value::string_map([("team", "x"), ("bad key", "y")]),
        );

        let errors = schema.validate(&attrs).unwrap_err();
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(errors.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("'name'")));
        assert!(messages.iter().any(|m| m.contains("'namespace'")));
        assert!(messages.iter().any(|m| m.contains("bad key")));
    }
}
