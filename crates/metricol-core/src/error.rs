//! Error types for configuration, data sources and delivery.
//!
//! None of these are fatal to the process once workers are running: the
//! worker loop logs them and treats the interval as empty. Only startup
//! configuration errors abort the agent.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the configuration or building a worker.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed INI syntax.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// The configuration declares no `output:` section.
    #[error("no \"output:...\" section(s) in config")]
    NoOutput,

    /// A section references a plugin that is not compiled in.
    #[error("[{section}] unknown plugin: {plugin:?}")]
    UnknownPlugin { section: String, plugin: String },

    /// A key the plugin declares as required is absent.
    #[error("[{section}] missing required key: {key}")]
    MissingKey { section: String, key: String },

    /// A key is present but its value cannot be used.
    #[error("[{section}] invalid value for {key}: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}

/// Errors raised while fetching raw data from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("command {command:?} failed: {message}")]
    Command { command: String, message: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The source has no usable resource yet (setup failed earlier).
    #[error("source not ready: {0}")]
    NotReady(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Errors raised while delivering a batch to a remote collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector answered {0}")]
    Status(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {0} connection attempts")]
    Exhausted(u32),

    #[error("transport not ready: {0}")]
    NotReady(String),
}
