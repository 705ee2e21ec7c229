//! xcform client
//!
//! `reqwest`-based [`xcform_core::transport::ClientTransport`] for the F5
//! Distributed Cloud configuration API, with token authentication and
//! retries.

pub mod config;
pub mod http;

pub use config::{ClientConfig, ConfigError};
pub use http::HttpTransport;
