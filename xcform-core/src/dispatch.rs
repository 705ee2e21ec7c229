//! Dispatch - Host-facing surface of the provider
//!
//! `ProviderServer` turns every registered descriptor into a
//! `GenericResource` exposing the calls a host makes: metadata, schema,
//! plan, create, read, update, delete and import. The transport is injected
//! once at construction.

use std::sync::Arc;

use crate::controller::{Applied, OperationContext, ReadOutcome, ResourceController};
use crate::descriptor::{DescriptorRegistry, ResourceDescriptor};
use crate::error::{ResourceError, ResourceResult};
use crate::plan::{self, PlannedChange};
use crate::private_state::PrivateState;
use crate::resource::ResourceInstance;
use crate::schema::ResourceSchema;
use crate::timeouts::{TimeoutCategory, TimeoutOverrides};
use crate::transport::ClientTransport;

/// Attribute holding per-instance timeout overrides
pub const ATTR_TIMEOUTS: &str = "timeouts";

/// What a host needs to know to address a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    /// Host-visible type name, `<provider>_<kind>`
    pub type_name: String,
    pub timeout_category: TimeoutCategory,
}

/// One resource kind bound to a transport
#[derive(Clone)]
pub struct GenericResource {
    provider_name: String,
    controller: ResourceController,
}

impl GenericResource {
    pub fn new(provider_name: impl Into<String>, controller: ResourceController) -> Self {
        Self {
            provider_name: provider_name.into(),
            controller,
        }
    }

    pub fn metadata(&self) -> ResourceMetadata {
        let descriptor = self.descriptor();
        ResourceMetadata {
            type_name: format!("{}_{}", self.provider_name, descriptor.type_name),
            timeout_category: descriptor.timeout_category,
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.descriptor().schema
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        self.controller.descriptor()
    }

    /// Classify the change from `prior` to `config`, validating `config` first
    pub fn plan(
        &self,
        prior: Option<&ResourceInstance>,
        config: &ResourceInstance,
    ) -> ResourceResult<PlannedChange> {
        let config = self.prepare(config)?;
        if let Err(errors) = self.schema().validate(&config.attributes) {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ResourceError::validation(
                &self.descriptor().type_name,
                messages.join("; "),
            ));
        }
        Ok(plan::plan_change(self.descriptor(), prior, &config))
    }

    pub async fn create(
        &self,
        ctx: &OperationContext,
        config: &ResourceInstance,
    ) -> ResourceResult<Applied> {
        let config = self.prepare(config)?;
        self.controller.create(ctx, &config).await
    }

    pub async fn read(
        &self,
        ctx: &OperationContext,
        state: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<ReadOutcome> {
        self.controller.read(ctx, state, private).await
    }

    pub async fn update(
        &self,
        ctx: &OperationContext,
        state: &ResourceInstance,
        config: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<Applied> {
        let config = self.prepare(config)?;
        self.controller.update(ctx, state, &config, private).await
    }

    pub async fn delete(
        &self,
        ctx: &OperationContext,
        state: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<Vec<String>> {
        self.controller.delete(ctx, state, private).await
    }

    pub async fn import_state(&self, ctx: &OperationContext, id: &str) -> ResourceResult<Applied> {
        self.controller.import(ctx, id).await
    }

    /// Move a `timeouts` attribute into the instance's overrides
    fn prepare(&self, config: &ResourceInstance) -> ResourceResult<ResourceInstance> {
        let mut config = config.clone();
        let Some(raw) = config.attributes.remove(ATTR_TIMEOUTS) else {
            return Ok(config);
        };
        let overrides = TimeoutOverrides::from_value(&raw)
            .map_err(|e| ResourceError::validation(&self.descriptor().type_name, e.to_string()))?;
        if !overrides.is_empty() {
            config.timeouts = overrides;
        }
        Ok(config)
    }
}

/// Every registered kind of one provider
pub struct ProviderServer {
    name: String,
    registry: DescriptorRegistry,
    transport: Arc<dyn ClientTransport>,
}

impl ProviderServer {
    pub fn new(
        name: impl Into<String>,
        registry: DescriptorRegistry,
        transport: Arc<dyn ClientTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a kind by bare name (`healthcheck`) or host name (`f5xc_healthcheck`)
    pub fn resource(&self, type_name: &str) -> ResourceResult<GenericResource> {
        let prefix = format!("{}_", self.name);
        let kind = match type_name.strip_prefix(&prefix) {
            Some(kind) if self.registry.get(kind).is_some() => kind,
            _ => type_name,
        };
        let descriptor = self.registry.require(kind)?;
        Ok(self.bind(descriptor))
    }

    /// All resources, sorted by kind
    pub fn resources(&self) -> Vec<GenericResource> {
        self.registry
            .type_names()
            .into_iter()
            .filter_map(|name| self.registry.get(name))
            .map(|descriptor| self.bind(descriptor))
            .collect()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.registry
            .type_names()
            .into_iter()
            .map(|kind| format!("{}_{}", self.name, kind))
            .collect()
    }

    fn bind(&self, descriptor: Arc<ResourceDescriptor>) -> GenericResource {
        GenericResource::new(
            self.name.clone(),
            ResourceController::new(descriptor, Arc::clone(&self.transport)),
        )
    }
}
