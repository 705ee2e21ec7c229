//! xcform state
//!
//! Persists tracked instances together with their private sidecar, guarded
//! by a lock so two runs never write the same state concurrently.
//!
//! ```ignore
//! use xcform_state::{StateBackend, backends::LocalBackend};
//!
//! let backend = LocalBackend::with_path("xcform.state.json".into());
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply changes ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
