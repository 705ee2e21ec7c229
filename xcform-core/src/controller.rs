//! Controller - Generic create/read/update/delete/import for one resource kind
//!
//! A controller is parameterized by a [`ResourceDescriptor`] and holds a shared
//! transport. It keeps no per-instance state: the host guarantees at most one
//! in-flight operation per instance. Every remote call is bounded by the
//! resolved timeout and the caller's cancellation token. Nothing is retried
//! here and nothing is rolled back.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::descriptor::ResourceDescriptor;
use crate::envelope::Envelope;
use crate::error::{CancelCause, ResourceError, ResourceResult};
use crate::identity;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::mapper::{self, ReadContext};
use crate::plan::changed_attributes;
use crate::private_state::{ApiMetadata, PrivateState, load_api_metadata, save_api_metadata};
use crate::resource::{ATTR_ID, ATTR_NAME, ATTR_NAMESPACE, ResourceInstance, Value};
use crate::timeouts::{Operation, resolve_timeout};
use crate::transport::{ClientTransport, TransportError, TransportResult};

/// Caller-supplied cancellation for one operation
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Instance produced by a successful create, update or import
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub instance: ResourceInstance,
    pub private: PrivateState,
    pub warnings: Vec<String>,
}

/// Result of refreshing a tracked instance
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(Applied),
    /// The remote object is gone; stop tracking the instance
    Removed,
}

/// Generic lifecycle controller for one resource kind
#[derive(Clone)]
pub struct ResourceController {
    descriptor: Arc<ResourceDescriptor>,
    transport: Arc<dyn ClientTransport>,
}

impl ResourceController {
    pub fn new(descriptor: Arc<ResourceDescriptor>, transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            descriptor,
            transport,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn type_name(&self) -> &str {
        &self.descriptor.type_name
    }

    /// Create the remote object declared by `config`
    pub async fn create(
        &self,
        ctx: &OperationContext,
        config: &ResourceInstance,
    ) -> ResourceResult<Applied> {
        let mut lifecycle = Lifecycle::start(config.address(), LifecycleState::Planned);
        let request = mapper::to_envelope(&self.descriptor, config)?;

        lifecycle.advance(LifecycleState::Creating);
        let response = self
            .bounded(ctx, Operation::Create, config, |t, d| {
                Box::pin(async move { t.create(d, &request).await })
            })
            .await?
            .map_err(|e| self.remote(Operation::Create, e))?;

        let instance = mapper::from_envelope(&self.descriptor, &response, ReadContext::refresh(config));
        let mut private = PrivateState::new();
        save_api_metadata(&mut private, &ApiMetadata::from_envelope(&response));

        lifecycle.advance(LifecycleState::Created);
        log::debug!("Created {}", instance.address());
        Ok(Applied {
            instance,
            private,
            warnings: Vec::new(),
        })
    }

    /// Refresh a tracked instance from the remote object
    pub async fn read(
        &self,
        ctx: &OperationContext,
        prior: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<ReadOutcome> {
        let mut private = private.clone();
        let importing = private.take_import_marker();
        let (operation, start) = if importing {
            (Operation::Import, LifecycleState::Importing)
        } else {
            (Operation::Read, LifecycleState::Reading)
        };

        let (namespace, name) = self.object_key(prior)?;
        let mut lifecycle = Lifecycle::start(prior.address(), start);

        let response = match self
            .bounded(ctx, operation, prior, |t, d| {
                let (namespace, name) = (namespace.clone(), name.clone());
                Box::pin(async move { t.get(d, &namespace, &name).await })
            })
            .await?
        {
            Ok(envelope) => envelope,
            Err(e) if e.is_not_found() => {
                lifecycle.advance(LifecycleState::NotFound);
                if importing {
                    return Err(ResourceError::NotFound {
                        resource_type: self.type_name().to_string(),
                        namespace,
                        name,
                    });
                }
                log::warn!(
                    "{} {}/{} no longer exists, removing it from state",
                    self.type_name(),
                    namespace,
                    name
                );
                return Ok(ReadOutcome::Removed);
            }
            Err(e) => return Err(self.remote(operation, e)),
        };

        let read_ctx = if importing {
            ReadContext::import(prior)
        } else {
            ReadContext::refresh(prior)
        };
        let instance = mapper::from_envelope(&self.descriptor, &response, read_ctx);
        let warnings = self.refresh_private_state(&mut private, &response);

        lifecycle.advance(LifecycleState::Created);
        Ok(ReadOutcome::Found(Applied {
            instance,
            private,
            warnings,
        }))
    }

    /// Update the remote object in place
    ///
    /// Identity and other requires-replace changes are rejected; they must be
    /// planned as a replacement.
    pub async fn update(
        &self,
        ctx: &OperationContext,
        prior: &ResourceInstance,
        config: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<Applied> {
        let replace: Vec<String> = changed_attributes(&self.descriptor, prior, config)
            .into_iter()
            .filter(|name| {
                self.descriptor
                    .schema
                    .get(name)
                    .is_some_and(|a| a.requires_replace)
            })
            .collect();
        if !replace.is_empty() {
            return Err(ResourceError::validation(
                self.type_name(),
                format!(
                    "cannot update {} in place, the change requires replacement",
                    replace.join(", ")
                ),
            ));
        }

        let mut lifecycle = Lifecycle::start(config.address(), LifecycleState::Created);
        let request = mapper::to_envelope(&self.descriptor, config)?;
        if let Some(metadata) = load_api_metadata(private) {
            log::debug!("Updating {} (uid {})", config.address(), metadata.uid);
        }

        lifecycle.advance(LifecycleState::Updating);
        let response = self
            .bounded(ctx, Operation::Update, config, |t, d| {
                Box::pin(async move { t.update(d, &request).await })
            })
            .await?
            .map_err(|e| {
                if e.is_not_found() {
                    self.not_found(config)
                } else {
                    self.remote(Operation::Update, e)
                }
            })?;

        let instance = mapper::from_envelope(&self.descriptor, &response, ReadContext::refresh(config));
        let mut private = private.clone();
        save_api_metadata(&mut private, &ApiMetadata::from_envelope(&response));

        lifecycle.advance(LifecycleState::Created);
        log::debug!("Updated {}", instance.address());
        Ok(Applied {
            instance,
            private,
            warnings: Vec::new(),
        })
    }

    /// Delete the remote object; an already absent object is success
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        prior: &ResourceInstance,
        private: &PrivateState,
    ) -> ResourceResult<Vec<String>> {
        let (namespace, name) = self.object_key(prior)?;
        let mut lifecycle = Lifecycle::start(prior.address(), LifecycleState::Created);
        if let Some(metadata) = load_api_metadata(private) {
            log::debug!("Deleting {} (uid {})", prior.address(), metadata.uid);
        }

        lifecycle.advance(LifecycleState::Deleting);
        let result = self
            .bounded(ctx, Operation::Delete, prior, |t, d| {
                let (namespace, name) = (namespace.clone(), name.clone());
                Box::pin(async move { t.delete(d, &namespace, &name).await })
            })
            .await?;

        let mut warnings = Vec::new();
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                log::debug!("{} already absent", prior.address());
            }
            Err(e) if e.is_not_implemented() => {
                let warning = format!(
                    "{} {}/{} cannot be deleted through the API, it was removed from state only",
                    self.type_name(),
                    namespace,
                    name
                );
                log::warn!("{}", warning);
                warnings.push(warning);
            }
            Err(e) => return Err(self.remote(Operation::Delete, e)),
        }

        lifecycle.advance(LifecycleState::Deleted);
        log::debug!("Deleted {}", prior.address());
        Ok(warnings)
    }

    /// Import an existing object from its `namespace/name` identifier
    pub async fn import(&self, ctx: &OperationContext, id: &str) -> ResourceResult<Applied> {
        let (namespace, name) = identity::decode(id)?;
        let seed = ResourceInstance::new(self.type_name())
            .with_attribute(ATTR_NAMESPACE, namespace)
            .with_attribute(ATTR_NAME, name)
            .with_attribute(ATTR_ID, id);

        let mut private = PrivateState::new();
        private.mark_import();

        let mut lifecycle = Lifecycle::start(seed.address(), LifecycleState::ExternalId);
        lifecycle.advance(LifecycleState::Importing);
        match self.read(ctx, &seed, &private).await? {
            ReadOutcome::Found(applied) => {
                log::debug!("Imported {}", applied.instance.address());
                Ok(applied)
            }
            // Import reads report a missing object as an error
            ReadOutcome::Removed => Err(self.not_found(&seed)),
        }
    }

    /// Namespace and name of a tracked instance, falling back to its `id`
    fn object_key(&self, instance: &ResourceInstance) -> ResourceResult<(String, String)> {
        match (instance.namespace(), instance.name()) {
            (Some(ns), Some(name)) if !ns.is_empty() && !name.is_empty() => {
                Ok((ns.to_string(), name.to_string()))
            }
            _ => match instance.get(ATTR_ID) {
                Value::String(id) => Ok(identity::decode(id)?),
                _ => Err(ResourceError::validation(
                    self.type_name(),
                    "instance has neither namespace/name nor id",
                )),
            },
        }
    }

    fn refresh_private_state(&self, private: &mut PrivateState, response: &Envelope) -> Vec<String> {
        let current = ApiMetadata::from_envelope(response);
        let mut warnings = Vec::new();
        if let Some(stored) = load_api_metadata(private) {
            let drift = stored.detect_drift(response);
            if drift.modified_externally {
                log::debug!(
                    "{} {} was modified since last observed",
                    self.type_name(),
                    response.metadata.name
                );
            }
            for warning in drift.warnings() {
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        save_api_metadata(private, &current);
        warnings
    }

    fn not_found(&self, instance: &ResourceInstance) -> ResourceError {
        ResourceError::NotFound {
            resource_type: self.type_name().to_string(),
            namespace: instance.namespace().unwrap_or_default().to_string(),
            name: instance.name().unwrap_or_default().to_string(),
        }
    }

    fn remote(&self, operation: Operation, source: TransportError) -> ResourceError {
        log::error!("Failed to {} {}: {}", operation, self.type_name(), source);
        ResourceError::Remote {
            operation,
            resource_type: self.type_name().to_string(),
            source,
        }
    }

    fn cancelled(&self, operation: Operation, cause: CancelCause) -> ResourceError {
        ResourceError::Cancelled {
            operation,
            resource_type: self.type_name().to_string(),
            cause,
        }
    }

    /// Run one remote call under the resolved timeout and the caller's token
    ///
    /// The outer error is a cancellation; the inner result is the transport's.
    async fn bounded<'a, T, F>(
        &'a self,
        ctx: &OperationContext,
        operation: Operation,
        instance: &ResourceInstance,
        call: F,
    ) -> ResourceResult<TransportResult<T>>
    where
        F: FnOnce(
            &'a dyn ClientTransport,
            &'a ResourceDescriptor,
        ) -> std::pin::Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>,
    {
        if ctx.is_cancelled() {
            return Err(self.cancelled(operation, CancelCause::Requested));
        }

        let budget = resolve_timeout(
            self.descriptor.timeout_category,
            operation,
            &instance.timeouts,
        );
        let call = call(self.transport.as_ref(), self.descriptor.as_ref());

        tokio::select! {
            biased;
            _ = ctx.token().cancelled() => {
                Err(self.cancelled(operation, CancelCause::Requested))
            }
            result = tokio::time::timeout(budget, call) => match result {
                Ok(result) => Ok(result),
                Err(_) => Err(self.cancelled(operation, CancelCause::DeadlineExceeded(budget))),
            },
        }
    }
}
