use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{Persistence, PersistenceError};

/// Stores each key as a file in `root`.
///
/// Writes go to a temporary sibling first and are renamed over the target, so a
/// reader sees either the old or the new value, never a partial one.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.contains(['/', '\\'])
            && key != "."
            && key != "..";
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Persistence for FileStore {
    async fn read(&self, key: &str) -> Result<String, PersistenceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Read {} ({} bytes)", path.display(), content.len());
                Ok(content)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(key.to_string()))
            }
            Err(source) => Err(PersistenceError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        let io_error = |source| PersistenceError::Io {
            key: key.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_error)?;

        let staging = self.root.join(format!(".{}.tmp", key));
        tokio::fs::write(&staging, value).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(io_error)?;

        debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }
}
