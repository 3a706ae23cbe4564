//! Error types for audio sync
use thiserror::Error;

/// Audio sync errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Socket could not be created or bound
    #[error("Socket error: {0}")]
    SocketError(String),

    /// Target address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// I/O error while sending or receiving
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
