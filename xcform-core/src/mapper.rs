//! Mapper - Translation between typed instances and the generic envelope
//!
//! Writes send the user's declared labels and annotations verbatim. Reads
//! strip system-reserved keys so platform-injected labels never show up as
//! drift. Absent fields read back as `Null`, never as a zero value.

use std::collections::HashMap;

use crate::descriptor::ResourceDescriptor;
use crate::envelope::{Envelope, ObjectMetadata};
use crate::error::{ResourceError, ResourceResult};
use crate::identity;
use crate::labels::filter_system_keys;
use crate::resource::{
    ATTR_ANNOTATIONS, ATTR_DESCRIPTION, ATTR_DISABLE, ATTR_ID, ATTR_LABELS, ATTR_NAME,
    ATTR_NAMESPACE, ResourceInstance, Value,
};
use crate::schema::{AttributeSchema, AttributeType, Location};

/// What the read path knows besides the envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadContext<'a> {
    /// Configuration or state the read refreshes
    pub prior: Option<&'a ResourceInstance>,
    /// The read completes an import
    pub importing: bool,
}

impl<'a> ReadContext<'a> {
    pub fn refresh(prior: &'a ResourceInstance) -> Self {
        Self {
            prior: Some(prior),
            importing: false,
        }
    }

    pub fn import(prior: &'a ResourceInstance) -> Self {
        Self {
            prior: Some(prior),
            importing: true,
        }
    }

    /// Optional nested blocks are only surfaced when imported or already tracked
    fn populates_block(&self, attr: &AttributeSchema) -> bool {
        if attr.is_computed() || !holds_block(&attr.attr_type) {
            return true;
        }
        self.importing || self.prior.is_some_and(|p| !p.get(&attr.name).is_null())
    }
}

fn holds_block(attr_type: &AttributeType) -> bool {
    match attr_type.base() {
        AttributeType::Block(_) => true,
        AttributeType::List(inner) => holds_block(inner),
        _ => false,
    }
}

/// Build the request envelope for a create or update call
pub fn to_envelope(
    descriptor: &ResourceDescriptor,
    instance: &ResourceInstance,
) -> ResourceResult<Envelope> {
    let schema = &descriptor.schema;
    if let Err(errors) = schema.validate(&instance.attributes) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(ResourceError::validation(
            &descriptor.type_name,
            messages.join("; "),
        ));
    }

    let (namespace, name) = match (instance.namespace(), instance.name()) {
        (Some(ns), Some(n)) if !ns.is_empty() && !n.is_empty() => (ns, n),
        _ => {
            return Err(ResourceError::validation(
                &descriptor.type_name,
                "name and namespace must be non-empty",
            ));
        }
    };

    let metadata = ObjectMetadata {
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels: instance.get(ATTR_LABELS).to_string_map(),
        annotations: instance.get(ATTR_ANNOTATIONS).to_string_map(),
        description: instance.get_str(ATTR_DESCRIPTION).map(str::to_string),
        disable: instance.get(ATTR_DISABLE).as_bool(),
        uid: None,
    };

    let mut spec = serde_json::Map::new();
    for attr in schema.attributes.values() {
        if attr.location != Location::Spec || attr.is_computed_only() {
            continue;
        }
        let value = instance.get(&attr.name);
        if value.is_null() {
            continue;
        }
        spec.insert(
            attr.wire_name().to_string(),
            value_to_json(&attr.attr_type, value),
        );
    }

    Ok(Envelope {
        metadata,
        spec,
        system_metadata: None,
    })
}

/// Refresh a typed instance from a response envelope
pub fn from_envelope(
    descriptor: &ResourceDescriptor,
    envelope: &Envelope,
    ctx: ReadContext<'_>,
) -> ResourceInstance {
    let meta = &envelope.metadata;
    let mut instance = ResourceInstance::new(&descriptor.type_name);
    if let Some(prior) = ctx.prior {
        instance.timeouts = prior.timeouts;
    }

    instance.set(ATTR_NAME, Value::String(meta.name.clone()));
    instance.set(ATTR_NAMESPACE, Value::String(meta.namespace.clone()));
    instance.set(
        ATTR_ID,
        Value::String(identity::encode(&meta.namespace, &meta.name)),
    );

    instance.set(
        ATTR_DESCRIPTION,
        meta.description
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    instance.set(ATTR_LABELS, user_map(meta.labels.as_ref()));
    instance.set(ATTR_ANNOTATIONS, user_map(meta.annotations.as_ref()));
    instance.set(
        ATTR_DISABLE,
        meta.disable.map(Value::Bool).unwrap_or(Value::Null),
    );

    for attr in descriptor.schema.attributes.values() {
        if attr.location != Location::Spec {
            continue;
        }
        let value = if ctx.populates_block(attr) {
            spec_value(attr, envelope.spec.get(attr.wire_name()))
        } else {
            Value::Null
        };
        instance.set(&attr.name, value);
    }

    instance
}

/// Filtered label or annotation map; empty maps become `Null`
fn user_map(raw: Option<&HashMap<String, String>>) -> Value {
    match raw.map(filter_system_keys) {
        Some(map) if !map.is_empty() => Value::string_map(map),
        _ => Value::Null,
    }
}

fn spec_value(attr: &AttributeSchema, json: Option<&serde_json::Value>) -> Value {
    let value = match json {
        None | Some(serde_json::Value::Null) => return Value::Null,
        Some(json) => json_to_value(&attr.attr_type, json),
    };

    match (&value, &attr.zero_default) {
        (v, Some(default)) if v.is_zero() => default.clone(),
        (Value::Map(map), None)
            if map.is_empty() && matches!(attr.attr_type.base(), AttributeType::Map(_)) =>
        {
            Value::Null
        }
        _ => value,
    }
}

/// Convert an envelope field guided by the attribute type
pub fn json_to_value(attr_type: &AttributeType, json: &serde_json::Value) -> Value {
    match (attr_type.base(), json) {
        (_, serde_json::Value::Null) => Value::Null,
        (AttributeType::String | AttributeType::Enum(_), serde_json::Value::String(s)) => {
            Value::String(s.clone())
        }
        (AttributeType::String, serde_json::Value::Number(n)) => Value::String(n.to_string()),
        (AttributeType::Int, serde_json::Value::String(s)) => match s.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::String(s.clone()),
        },
        (AttributeType::Bool, serde_json::Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s.clone()),
        },
        (AttributeType::List(inner), serde_json::Value::Array(items)) => {
            Value::List(items.iter().map(|i| json_to_value(inner, i)).collect())
        }
        (AttributeType::Map(inner), serde_json::Value::Object(map)) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(inner, v)))
                .collect(),
        ),
        (AttributeType::Block(attributes), serde_json::Value::Object(map)) => {
            let mut block = HashMap::new();
            for attr in attributes.values() {
                if let Some(v) = map.get(attr.wire_name())
                    && !v.is_null()
                {
                    block.insert(attr.name.clone(), json_to_value(&attr.attr_type, v));
                }
            }
            Value::Map(block)
        }
        _ => Value::from_json(json),
    }
}

/// Convert a typed value into its envelope field
pub fn value_to_json(attr_type: &AttributeType, value: &Value) -> serde_json::Value {
    match (attr_type.base(), value) {
        (AttributeType::List(inner), Value::List(items)) => {
            serde_json::Value::Array(items.iter().map(|i| value_to_json(inner, i)).collect())
        }
        (AttributeType::Map(inner), Value::Map(map)) => serde_json::Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), value_to_json(inner, v)))
                .collect(),
        ),
        (AttributeType::Block(attributes), Value::Map(map)) => {
            let mut object = serde_json::Map::new();
            for (key, v) in map {
                if v.is_null() {
                    continue;
                }
                match attributes.get(key) {
                    Some(attr) if attr.is_computed_only() => {}
                    Some(attr) => {
                        object.insert(
                            attr.wire_name().to_string(),
                            value_to_json(&attr.attr_type, v),
                        );
                    }
                    None => {
                        object.insert(key.clone(), v.to_json());
                    }
                }
            }
            serde_json::Value::Object(object)
        }
        _ => value.to_json(),
    }
}
