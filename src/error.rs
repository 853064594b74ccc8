//! Error types for Reply Autopilot.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contact policy store errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to persist policy to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from external collaborators (draft, memory, transport, feedback).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} returned status {status}")]
    Rejected { service: String, status: u16 },

    #[error("Invalid request to {service}: {reason}")]
    InvalidRequest { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("{service} is not configured: {reason}")]
    NotConfigured { service: String, reason: String },
}

impl ServiceError {
    /// Wrap a reqwest failure for the named service.
    pub fn request(service: &str, err: reqwest::Error) -> Self {
        Self::RequestFailed {
            service: service.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Message pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Draft generation failed: {0}")]
    Draft(#[source] ServiceError),

    #[error("Ingest queue is full")]
    QueueFull,

    #[error("Ingest queue is closed")]
    QueueClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
