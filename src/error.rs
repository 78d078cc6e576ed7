//! Error taxonomy
//!
//! Every variant here is recovered locally: callers log it and fall back to a
//! safe default (empty store, fallback instruction, apology reply).

use std::path::PathBuf;
use thiserror::Error;

/// Failure reading or writing a conversation snapshot.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single completion request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API_KEY is not set")]
    MissingCredential,

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion response contained no choices")]
    NoChoices,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to load conversation history from {path:?}: {source}")]
    HistoryLoad {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("failed to flush conversation history to {path:?}: {source}")]
    HistoryFlush {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("failed to read instructions from {path:?}: {source}")]
    InstructionsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
