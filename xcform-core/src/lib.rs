//! xcform core
//!
//! Generic CRUD-binding engine: one table-driven controller serves every
//! resource kind of a namespace-scoped control-plane API. A kind is described
//! by a [`descriptor::ResourceDescriptor`]; the remote side is reached through
//! a [`transport::ClientTransport`].

pub mod catalog;
pub mod controller;
pub mod descriptor;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod labels;
pub mod lifecycle;
pub mod mapper;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod plan;
pub mod private_state;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod transport;
