// Process settings with layered configuration (defaults, file, env)
//
// These are the service's own knobs. The dispatch record edited through the
// API (monitor folder, WeCom credentials, schedule) lives in `models` and is
// persisted by `store`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WECOM_BASE_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub wecom_api: WeComApiConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the dispatch configuration record
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComApiConfig {
    pub base_url: String,
    /// Bound applied to every outbound platform call
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the background loop wakes up
    pub tick_millis: u64,
    /// How long `stop()` waits for the loop before giving up
    pub stop_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            // Start with built-in defaults so every key is present
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        if self.server.max_upload_bytes == 0 {
            return Err("Server max_upload_bytes must be greater than 0".to_string());
        }

        if self.storage.config_path.as_os_str().is_empty() {
            return Err("Storage config_path cannot be empty".to_string());
        }

        if self.wecom_api.base_url.is_empty() {
            return Err("WeCom base_url cannot be empty".to_string());
        }
        if self.wecom_api.timeout_seconds == 0 {
            return Err("WeCom timeout_seconds must be greater than 0".to_string());
        }

        if self.scheduler.tick_millis == 0 {
            return Err("Scheduler tick_millis must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_upload_bytes: default_max_upload_bytes(),
            },
            storage: StorageConfig {
                config_path: PathBuf::from("config.json"),
            },
            wecom_api: WeComApiConfig {
                base_url: DEFAULT_WECOM_BASE_URL.to_string(),
                timeout_seconds: 30,
            },
            scheduler: SchedulerConfig {
                tick_millis: 1000,
                stop_timeout_seconds: 2,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}
