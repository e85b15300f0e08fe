use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Persistence, PersistenceError};
use crate::role::Role;

/// Key of the persisted host name
pub const CONFIG_KEY: &str = "config.txt";

/// Controller address used when nothing has been stored yet
pub const DEFAULT_HOST_NAME: &str = "169.254.250.82";

/// Persisted role flag: the controller host name the robot connects to.
///
/// An empty host name is meaningful and selects the controller role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host_name: String,
}

impl HostConfig {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    pub fn role(&self) -> Role {
        Role::from_host_name(&self.host_name)
    }
}

/// Loads and saves the [`HostConfig`] through a [`Persistence`] backend
#[derive(Clone)]
pub struct ConfigStore {
    backend: Arc<dyn Persistence>,
    default_host_name: String,
}

impl ConfigStore {
    /// An empty default would select the controller role on first start and
    /// make switching a no-op, so it is replaced by [`DEFAULT_HOST_NAME`].
    pub fn new(backend: Arc<dyn Persistence>, default_host_name: impl Into<String>) -> Self {
        let mut default_host_name = default_host_name.into();
        if default_host_name.is_empty() {
            warn!(
                "Default host name must not be empty, using {}",
                DEFAULT_HOST_NAME
            );
            default_host_name = DEFAULT_HOST_NAME.to_string();
        }

        Self {
            backend,
            default_host_name,
        }
    }

    pub fn default_host_name(&self) -> &str {
        &self.default_host_name
    }

    /// Reads the stored host name, falling back to the default when nothing is
    /// stored or the value cannot be read.
    pub async fn load(&self) -> HostConfig {
        match self.backend.read(CONFIG_KEY).await {
            Ok(host_name) => {
                info!("Loaded host name {:?}", host_name);
                HostConfig::new(host_name)
            }
            Err(PersistenceError::NotFound(_)) => {
                debug!("Configuration does not exist yet, using default host name");
                HostConfig::new(self.default_host_name.clone())
            }
            Err(e) => {
                warn!("Failed to read configuration, using default host name: {}", e);
                HostConfig::new(self.default_host_name.clone())
            }
        }
    }

    pub async fn save(&self, config: &HostConfig) -> Result<(), PersistenceError> {
        self.backend.write(CONFIG_KEY, &config.host_name).await?;
        info!("Saved host name {:?}", config.host_name);
        Ok(())
    }
}
