//! Error types for metapush.

use std::path::PathBuf;
use thiserror::Error;

/// Local state errors (cache, key files, package metadata)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to (de)serialize {path}: {message}")]
    Serialization { path: PathBuf, message: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Payload encode/decode errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Encoded script is {size} bytes, maximum is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Payload still references placeholder id {0}")]
    Unsealed(String),
}

/// Pipeline errors for push and clone
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot find required file(s): {}. Create them before pushing.", format_paths(.paths))]
    ConfigurationMissing { paths: Vec<PathBuf> },

    #[error("Format error: {0}")]
    Format(String),

    #[error("No unspent outputs available from funding key. Add funds to: {address}")]
    InsufficientFunds { address: String },

    #[error("Encoded script is {size} bytes, maximum is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Transaction {tx_id} rejected: {reason}")]
    BroadcastRejected { tx_id: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Gave up waiting for {what} after {attempts} attempts")]
    PollExhausted { what: String, attempts: u32 },

    #[error("Refusing to sign: {0}")]
    UnsealedPayload(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<CodecError> for PipelineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Format(msg) => PipelineError::Format(msg),
            CodecError::PayloadTooLarge { size, limit } => {
                PipelineError::PayloadTooLarge { size, limit }
            }
            CodecError::Unsealed(id) => PipelineError::UnsealedPayload(format!(
                "payload still references placeholder id {}",
                id
            )),
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Network(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            PipelineError::Network(format!("Connection error: {}", err))
        } else {
            PipelineError::Network(format!("HTTP error: {}", err))
        }
    }
}

impl PipelineError {
    /// Whether a polling loop may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Network(_))
    }
}
