// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// Covers configuration, network, protocol and resource failures. Transient
/// network errors are recovered by the pool session; resource and
/// accelerator errors abort the affected worker.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors raised by the batch hash accelerator (initialization or compute)
    #[error("Accelerator error: {0}")]
    AcceleratorError(String),

    /// Failure to allocate per-worker buffers such as the collision table
    #[error("Resource exhausted: {0}")]
    ResourceError(String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// TOML configuration parsing errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Worker thread lifecycle errors
    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl From<ctrlc::Error> for MinerError {
    fn from(e: ctrlc::Error) -> Self {
        MinerError::ConfigError(format!("Failed to install signal handler: {}", e))
    }
}
