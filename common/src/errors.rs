// Error handling framework
// One enum per component; callers decide how to log and surface each failure.

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid schedule time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Unsupported schedule frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("No next execution time available for {frequency} schedule")]
    NoNextExecution { frequency: String },
}

/// Messaging platform (WeCom) client errors
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Platform rejected {operation}: errcode={errcode}, errmsg={errmsg}")]
    Rejected {
        operation: &'static str,
        errcode: i64,
        errmsg: String,
    },

    #[error("Invalid platform response for {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read file {path}: {reason}")]
    FileRead { path: String, reason: String },
}

impl MessagingError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            MessagingError::Transport(_) => "transport",
            MessagingError::Rejected { .. } => "rejected",
            MessagingError::InvalidResponse { .. } => "invalid_response",
            MessagingError::FileNotFound(_) | MessagingError::FileRead { .. } => "filesystem",
        }
    }
}

/// Inbound callback verification errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Callback token, AES key or corp id is not configured")]
    MissingConfig,

    #[error("Invalid AES key: {0}")]
    InvalidAesKey(String),

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Failed to decrypt echo: {0}")]
    Decrypt(String),

    #[error("Receive id does not match configured corp id")]
    CorpIdMismatch,
}

impl CallbackError {
    /// Configuration faults are the operator's problem, not the caller's
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CallbackError::MissingConfig | CallbackError::InvalidAesKey(_)
        )
    }
}

/// Configuration storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Filesystem error: {0}")]
    FileSystemError(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// Dispatch (select → upload → send) errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Monitor folder is not configured")]
    MissingMonitorFolder,

    #[error("Failed to load configuration: {0}")]
    Config(#[from] StorageError),

    #[error("Folder scan did not complete: {0}")]
    Scan(String),

    #[error("File upload failed: {0}")]
    Upload(#[source] MessagingError),

    #[error("Message send failed: {0}")]
    Send(#[source] MessagingError),
}

impl DispatchError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::MissingMonitorFolder => "missing_monitor_folder",
            DispatchError::Config(_) => "config",
            DispatchError::Scan(_) => "scan",
            DispatchError::Upload(_) => "upload",
            DispatchError::Send(_) => "send",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidJson(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::FileSystemError(err.to_string())
    }
}

impl From<reqwest::Error> for MessagingError {
    fn from(err: reqwest::Error) -> Self {
        MessagingError::Transport(err.to_string())
    }
}
