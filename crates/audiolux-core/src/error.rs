//! Error types for the audio pipeline
use thiserror::Error;

/// Core pipeline errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Audio source could not be opened or initialized
    #[error("Audio source error: {0}")]
    SourceError(String),

    /// Audio source ran out of data or its backend went away
    #[error("Audio source disconnected: {0}")]
    SourceDisconnected(String),

    /// Configuration value outside its allowed range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// Spectral task could not be started
    #[error("Spectral task error: {0}")]
    TaskError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// WAV decoding error
    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
