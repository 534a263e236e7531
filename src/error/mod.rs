use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigId;

/// Errors produced by the runtime primitives (pool admission, waits,
/// dispatch).
///
/// Interruption and timeout are distinguishable so callers can react
/// differently: an interrupted wait leaves the thread's interrupt flag
/// set, a timed-out one does not.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The current thread was interrupted while waiting.
    #[error("thread interrupted")]
    Interrupted,

    /// A bounded wait elapsed before the condition was met.
    #[error("operation timed out")]
    TimedOut,

    /// Non-blocking pool admission failed: all permits are in use.
    #[error("thread pool saturated")]
    PoolSaturated,

    /// The operation was cancelled before it started.
    #[error("operation cancelled")]
    Cancelled,

    /// The component is not running (not started, or already stopped).
    #[error("runtime is not running")]
    NotRunning,
}

impl RuntimeError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Interrupted => "interrupted",
            RuntimeError::TimedOut => "timed_out",
            RuntimeError::PoolSaturated => "pool_saturated",
            RuntimeError::Cancelled => "cancelled",
            RuntimeError::NotRunning => "not_running",
        }
    }
}

/// Errors reported synchronously by [`ConfigManager`](crate::config::ConfigManager)
/// mutations and by the config file loader. The offending path rides in
/// the variant payload.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid __include__ entry in {}: {reason}", path.display())]
    InvalidInclude { path: PathBuf, reason: String },

    #[error("include cycle detected at {}", path.display())]
    IncludeCycle { path: PathBuf },

    #[error("invalid config id: {0}")]
    InvalidId(ConfigId),

    #[error("config does not match schema")]
    SchemaMismatch,

    #[error("config read failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
