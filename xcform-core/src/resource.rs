//! Resource - Representing resource instances and their attribute values

use std::collections::HashMap;

use crate::timeouts::TimeoutOverrides;

/// Attribute names shared by every resource kind
pub const ATTR_ID: &str = "id";
pub const ATTR_NAME: &str = "name";
pub const ATTR_NAMESPACE: &str = "namespace";
pub const ATTR_DESCRIPTION: &str = "description";
pub const ATTR_LABELS: &str = "labels";
pub const ATTR_ANNOTATIONS: &str = "annotations";
pub const ATTR_DISABLE: &str = "disable";

/// Attribute value of a resource
///
/// `Null` is the explicit "not set" state. It is never equal to an empty
/// string or an empty map.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for the zero value of the value's own type
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::Bool(b) => !b,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "Null".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }

    /// Build a map value from string pairs
    pub fn string_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    /// Extract a string-to-string map, skipping non-string entries
    pub fn to_string_map(&self) -> Option<HashMap<String, String>> {
        match self {
            Value::Map(map) => Some(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Schema-less conversion from JSON, used for persisted state
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::String(n.to_string()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One live, identified configuration unit bound to a remote object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceInstance {
    /// Resource kind (e.g., "healthcheck", "http_loadbalancer")
    pub resource_type: String,
    pub attributes: HashMap<String, Value>,
    /// Per-instance timeout overrides from the `timeouts` block
    pub timeouts: TimeoutOverrides,
}

impl ResourceInstance {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            timeouts: TimeoutOverrides::default(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutOverrides) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Attribute value, treating absence as `Null`
    pub fn get(&self, key: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(key).unwrap_or(&NULL)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).as_str()
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str(ATTR_NAME)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.get_str(ATTR_NAMESPACE)
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str(ATTR_ID)
    }

    pub fn labels(&self) -> Option<HashMap<String, String>> {
        self.get(ATTR_LABELS).to_string_map()
    }

    pub fn annotations(&self) -> Option<HashMap<String, String>> {
        self.get(ATTR_ANNOTATIONS).to_string_map()
    }

    /// Display address in the form `type.namespace/name`
    pub fn address(&self) -> String {
        format!(
            "{}.{}/{}",
            self.resource_type,
            self.namespace().unwrap_or("?"),
            self.name().unwrap_or("?")
        )
    }
}
