//! Mock transport for unit testing
//!
//! Stores objects in memory keyed by item path and behaves like the remote
//! API: it assigns UIDs, injects system labels, and answers missing objects
//! with NOT_FOUND. Failures can be scripted per operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::descriptor::ResourceDescriptor;
use crate::envelope::{Envelope, SystemMetadata};
use crate::timeouts::Operation;
use crate::transport::{ClientTransport, TransportError, TransportResult};

/// One call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub path: String,
    pub body: Option<Envelope>,
}

#[derive(Default)]
struct MockInner {
    objects: HashMap<String, Envelope>,
    failures: HashMap<Operation, TransportError>,
    calls: Vec<RecordedCall>,
    next_uid: u64,
    system_labels: HashMap<String, String>,
    delay: Option<Duration>,
}

/// In-memory [`ClientTransport`]
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object as if it had been created out of band
    pub fn insert(&self, descriptor: &ResourceDescriptor, envelope: Envelope) {
        let path = descriptor.item_path(&envelope.metadata.namespace, &envelope.metadata.name);
        self.lock().objects.insert(path, envelope);
    }

    /// Remove an object out of band
    pub fn remove(&self, descriptor: &ResourceDescriptor, namespace: &str, name: &str) {
        self.lock()
            .objects
            .remove(&descriptor.item_path(namespace, name));
    }

    pub fn object(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> Option<Envelope> {
        self.lock()
            .objects
            .get(&descriptor.item_path(namespace, name))
            .cloned()
    }

    /// Fail every subsequent call of `operation` with `error`
    pub fn fail(&self, operation: Operation, error: TransportError) {
        self.lock().failures.insert(operation, error);
    }

    /// Label the server adds to every stored object
    pub fn with_system_label(self, key: &str, value: &str) -> Self {
        self.lock()
            .system_labels
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Delay every call, to exercise timeouts and cancellation
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    async fn begin(
        &self,
        operation: Operation,
        path: String,
        body: Option<&Envelope>,
    ) -> TransportResult<()> {
        let delay = {
            let mut inner = self.lock();
            inner.calls.push(RecordedCall {
                operation,
                path,
                body: body.cloned(),
            });
            inner.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.lock().failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn store(&self, path: String, request: &Envelope, uid: Option<String>) -> Envelope {
        let mut inner = self.lock();
        let uid = uid.unwrap_or_else(|| {
            inner.next_uid += 1;
            format!("uid-{}", inner.next_uid)
        });

        let mut stored = request.clone();
        stored.metadata.uid = None;
        if !inner.system_labels.is_empty() {
            let labels = stored.metadata.labels.get_or_insert_with(HashMap::new);
            labels.extend(inner.system_labels.clone());
        }
        let revision = inner.calls.len();
        stored.system_metadata = Some(SystemMetadata {
            uid: Some(uid),
            modification_timestamp: Some(format!("rev-{}", revision)),
            tenant: Some("mock-tenant".to_string()),
            ..Default::default()
        });
        inner.objects.insert(path, stored.clone());
        stored
    }
}

#[async_trait]
impl ClientTransport for MockTransport {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<Envelope> {
        let path = descriptor.item_path(namespace, name);
        self.begin(Operation::Read, path.clone(), None).await?;
        self.lock()
            .objects
            .get(&path)
            .cloned()
            .ok_or_else(|| TransportError::not_found(format!("Resource not found: {}", path)))
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope> {
        let meta = &envelope.metadata;
        let collection = descriptor.collection_path(&meta.namespace);
        self.begin(Operation::Create, collection, Some(envelope))
            .await?;

        let path = descriptor.item_path(&meta.namespace, &meta.name);
        if self.lock().objects.contains_key(&path) {
            return Err(TransportError::from_status(
                409,
                format!("{} already exists", meta.name),
            ));
        }
        Ok(self.store(path, envelope, None))
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope> {
        let meta = &envelope.metadata;
        let path = descriptor.item_path(&meta.namespace, &meta.name);
        self.begin(Operation::Update, path.clone(), Some(envelope))
            .await?;

        let uid = match self.lock().objects.get(&path) {
            Some(existing) => existing.uid().map(str::to_string),
            None => {
                return Err(TransportError::not_found(format!(
                    "Resource not found: {}",
                    path
                )));
            }
        };
        Ok(self.store(path, envelope, uid))
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<()> {
        let path = descriptor.item_path(namespace, name);
        self.begin(Operation::Delete, path.clone(), None).await?;
        match self.lock().objects.remove(&path) {
            Some(_) => Ok(()),
            None => Err(TransportError::not_found(format!(
                "Resource not found: {}",
                path
            ))),
        }
    }
}
