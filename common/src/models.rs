use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recipient sentinel meaning "every member visible to the agent"
pub const ALL_USERS: &str = "@all";

// ============================================================================
// Dispatch configuration record
// ============================================================================

/// The persisted configuration record edited through the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub monitor_folder: String,
    #[serde(default)]
    pub wecom: WeComConfig,
    #[serde(default)]
    pub schedule: ScheduleSpec,
}

/// WeCom application credentials, recipients and callback secrets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeComConfig {
    #[serde(default)]
    pub corpid: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub agentid: String,
    /// User ids separated by `|`, or `@all`
    #[serde(default = "default_touser")]
    pub touser: String,
    /// Party (department) ids separated by `|`
    #[serde(default)]
    pub toparty: String,
    /// Callback verification token
    #[serde(default)]
    pub token: String,
    /// 43-character EncodingAESKey for callback decryption
    #[serde(default)]
    pub aes_key: String,
}

fn default_touser() -> String {
    ALL_USERS.to_string()
}

impl Default for WeComConfig {
    fn default() -> Self {
        Self {
            corpid: String::new(),
            secret: String::new(),
            agentid: String::new(),
            touser: default_touser(),
            toparty: String::new(),
            token: String::new(),
            aes_key: String::new(),
        }
    }
}

impl WeComConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            corp_id: self.corpid.clone(),
            secret: self.secret.clone(),
            agent_id: self.agentid.clone(),
        }
    }

    /// Configured recipients, as stored.
    ///
    /// `@all` applies only when the record has no `touser` key at all; an
    /// empty user list stays empty so a party-only audience is not widened.
    pub fn recipients(&self) -> Recipients {
        Recipients {
            to_user: self.touser.clone(),
            to_party: self.toparty.clone(),
        }
    }
}

/// Recurring schedule for the dispatch task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(default)]
    pub enabled: bool,
    /// HH:MM, local time
    #[serde(default = "default_schedule_time")]
    pub time: String,
    /// `daily` or `hourly`; anything else is kept but not scheduled
    #[serde(default = "default_frequency")]
    pub frequency: String,
}

fn default_schedule_time() -> String {
    "09:00".to_string()
}

fn default_frequency() -> String {
    "daily".to_string()
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            time: default_schedule_time(),
            frequency: default_frequency(),
        }
    }
}

// ============================================================================
// Messaging platform models
// ============================================================================

/// Application credentials bound to one client instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub corp_id: String,
    pub secret: String,
    pub agent_id: String,
}

/// Message targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    pub to_user: String,
    pub to_party: String,
}

impl Recipients {
    pub fn all() -> Self {
        Self {
            to_user: default_touser(),
            to_party: String::new(),
        }
    }
}

/// Handle returned by a media upload, consumed by exactly one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub media_id: String,
}

// ============================================================================
// Callback models
// ============================================================================

/// Query parameters of the platform's URL verification request
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackChallenge {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

/// Shared secrets needed to verify a callback
#[derive(Debug, Clone)]
pub struct CallbackSecrets {
    pub token: String,
    pub aes_key: String,
    pub corp_id: String,
}

impl From<&WeComConfig> for CallbackSecrets {
    fn from(config: &WeComConfig) -> Self {
        Self {
            token: config.token.clone(),
            aes_key: config.aes_key.clone(),
            corp_id: config.corpid.clone(),
        }
    }
}

// ============================================================================
// Dispatch results and status
// ============================================================================

/// Result of one dispatch run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Monitor folder had nothing eligible to send
    NoFile,
    Sent { file: PathBuf, media_id: String },
}

/// Scheduler status as reported to API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub next_run: Option<DateTime<Utc>>,
}
