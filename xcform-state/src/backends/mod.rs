//! Backend implementations

mod local;

pub use local::LocalBackend;
