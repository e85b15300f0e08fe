//! # Persistence Module
//!
//! Stores the one piece of state that survives a restart: the host name that
//! selects the device role.
//!
//! ## Key Abstractions
//! - [`Persistence`]: key/value store with whole-value replace semantics
//! - [`FileStore`]: one file per key inside a data directory
//! - [`ConfigStore`]: loads and saves the [`HostConfig`] under `config.txt`
//!
//! ## Error Handling Strategy
//! A missing value is the bootstrap case and is reported as
//! [`PersistenceError::NotFound`] so callers can fall back to defaults without
//! treating it as a failure. Every other I/O problem is an `Io` error that the
//! caller logs; nothing in here retries.

pub mod config_store;
pub mod file_store;

pub use config_store::{ConfigStore, HostConfig, CONFIG_KEY, DEFAULT_HOST_NAME};
pub use file_store::FileStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("No stored value for {0}")]
    NotFound(String),

    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn read(&self, key: &str) -> Result<String, PersistenceError>;

    /// Replaces the whole stored value for `key`
    async fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}
