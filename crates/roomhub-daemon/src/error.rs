//! Error types for the roomhub daemon.

/// Errors that end a connection or stop the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] roomhub_core::Error),

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(#[from] roomhub_rpc::CodecError),

    /// The controller did not open with a valid `register`
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Bad bind address or similar startup setting
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
