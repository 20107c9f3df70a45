// Persistence of the dispatch configuration record

use crate::errors::StorageError;
use crate::models::DispatchConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Load and save the single configuration record
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<DispatchConfig, StorageError>;

    async fn save(&self, config: &DispatchConfig) -> Result<(), StorageError>;
}

/// Configuration kept as pretty-printed JSON on disk.
///
/// A missing file is created with defaults. An unreadable or malformed file
/// yields defaults and is left untouched until the next save.
#[derive(Debug, Clone)]
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, config: &DispatchConfig) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<DispatchConfig, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Configuration file missing, writing defaults");
                let config = DispatchConfig::default();
                self.write(&config).await.map_err(|e| {
                    error!(error = %e, "Failed to write default configuration");
                    e
                })?;
                return Ok(config);
            }
            Err(e) => {
                warn!(error = %e, "Configuration file unreadable, using defaults");
                return Ok(DispatchConfig::default());
            }
        };

        match serde_json::from_str::<DispatchConfig>(&raw) {
            Ok(config) => {
                debug!("Configuration loaded");
                Ok(config)
            }
            Err(e) => {
                warn!(error = %e, "Configuration file malformed, using defaults");
                Ok(DispatchConfig::default())
            }
        }
    }

    #[instrument(skip(self, config), fields(path = %self.path.display()))]
    async fn save(&self, config: &DispatchConfig) -> Result<(), StorageError> {
        self.write(config).await.map_err(|e| {
            error!(error = %e, "Failed to save configuration");
            e
        })?;
        info!("Configuration saved");
        Ok(())
    }
}

/// In-process store, used where no file should be touched
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: RwLock<DispatchConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<DispatchConfig, StorageError> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &DispatchConfig) -> Result<(), StorageError> {
        *self.config.write().await = config.clone();
        Ok(())
    }
}
