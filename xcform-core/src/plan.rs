//! Plan - Classify the change between tracked state and configuration
//!
//! Compares the configuration with the tracked instance and decides whether
//! the remote object must be created, updated in place, or replaced.

use std::fmt;

use crate::descriptor::ResourceDescriptor;
use crate::identity;
use crate::resource::{ATTR_ID, ResourceInstance, Value};
use crate::schema::AttributeMode;

/// Required action for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    /// A requires-replace attribute changed: delete, then create
    Replace,
    Delete,
    NoOp,
}

impl ChangeAction {
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeAction::NoOp)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeAction::Create => "+",
            ChangeAction::Update => "~",
            ChangeAction::Replace => "-/+",
            ChangeAction::Delete => "-",
            ChangeAction::NoOp => " ",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Replace => "replace",
            ChangeAction::Delete => "delete",
            ChangeAction::NoOp => "no-op",
        };
        write!(f, "{}", name)
    }
}

/// Planned change for one instance
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub action: ChangeAction,
    /// Instance expected after apply, with unknown computed values carried from state
    pub planned: ResourceInstance,
    /// Attributes whose value differs from the tracked state, sorted
    pub changed_attributes: Vec<String>,
    /// Changed attributes that force replacement, sorted
    pub replace_attributes: Vec<String>,
}

/// Compute the change needed to move `prior` to `config`
pub fn plan_change(
    descriptor: &ResourceDescriptor,
    prior: Option<&ResourceInstance>,
    config: &ResourceInstance,
) -> PlannedChange {
    let mut planned = config.clone();

    let Some(prior) = prior else {
        if let (Some(ns), Some(name)) = (config.namespace(), config.name()) {
            planned.set(ATTR_ID, Value::String(identity::encode(ns, name)));
        }
        return PlannedChange {
            action: ChangeAction::Create,
            planned,
            changed_attributes: Vec::new(),
            replace_attributes: Vec::new(),
        };
    };

    // Unknown computed values keep the value from state
    for attr in descriptor.schema.attributes.values() {
        let keep_prior = match attr.mode {
            AttributeMode::Computed => true,
            AttributeMode::OptionalComputed => config.get(&attr.name).is_null(),
            _ => false,
        };
        if keep_prior {
            planned.set(attr.name.clone(), prior.get(&attr.name).clone());
        }
    }

    let changed_attributes = changed_attributes(descriptor, prior, &planned);
    let replace_attributes: Vec<String> = changed_attributes
        .iter()
        .filter(|name| {
            descriptor
                .schema
                .get(name)
                .is_some_and(|attr| attr.requires_replace)
        })
        .cloned()
        .collect();

    let action = if !replace_attributes.is_empty() {
        ChangeAction::Replace
    } else if !changed_attributes.is_empty() {
        ChangeAction::Update
    } else {
        ChangeAction::NoOp
    };

    if action == ChangeAction::Replace {
        // The replacement gets a fresh identity
        for attr in descriptor.schema.attributes.values() {
            if attr.is_computed_only() {
                planned.set(attr.name.clone(), Value::Null);
            }
        }
        if let (Some(ns), Some(name)) = (config.namespace(), config.name()) {
            planned.set(ATTR_ID, Value::String(identity::encode(ns, name)));
        }
    }

    PlannedChange {
        action,
        planned,
        changed_attributes,
        replace_attributes,
    }
}

/// Plan the removal of a tracked instance that is no longer configured
pub fn plan_delete(prior: &ResourceInstance) -> PlannedChange {
    PlannedChange {
        action: ChangeAction::Delete,
        planned: prior.clone(),
        changed_attributes: Vec::new(),
        replace_attributes: Vec::new(),
    }
}

/// Schema attributes whose value differs between two instances
pub fn changed_attributes(
    descriptor: &ResourceDescriptor,
    from: &ResourceInstance,
    to: &ResourceInstance,
) -> Vec<String> {
    let mut changed: Vec<String> = descriptor
        .schema
        .attributes
        .values()
        .filter(|attr| !attr.is_computed_only())
        .filter(|attr| from.get(&attr.name) != to.get(&attr.name))
        .map(|attr| attr.name.clone())
        .collect();
    changed.sort_unstable();
    changed
}
