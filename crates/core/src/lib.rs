//! Core functionality for the attestation certificate authority.
//!
//! This crate provides the configuration, error, logging and time helpers
//! shared by the codec, validation and provisioning crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{AuthorityConfig, Config, PolicyConfig, ServerConfig, StorageConfig};
pub use error::{CoreError, Result};
pub use types::{current_timestamp, Timestamp};
