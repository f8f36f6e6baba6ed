use crate::core::protocol::ApiError;
use thiserror::Error;

/// Main error type for the admin SDK
#[derive(Error, Debug)]
pub enum AdminError {
    /// Invalid route or app configuration, rejected before anything is sent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The service rejected the credentials during the verification handshake
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The session is in a failed state and no command can be issued
    #[error("Unable to establish connection to Heliograph service")]
    ServiceUnreachable,

    /// The remote side reported an error for a specific command
    #[error("{}", .0.message)]
    Api(ApiError),

    /// WebSocket transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// An internal channel closed while a caller was still waiting on it
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type for admin SDK operations
pub type Result<T> = std::result::Result<T, AdminError>;
