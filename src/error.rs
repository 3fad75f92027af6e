//! Custom error types for the application

use thiserror::Error;

/// Application-specific error type
#[derive(Error, Debug)]
pub enum MeterError {
    /// Empty or malformed sample block
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No capture device, permission denied or unreadable file
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Audio stream related errors
    #[error("Audio stream error: {0}")]
    AudioStream(String),

    /// Rejected pipeline configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// General I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MeterError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a source unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error ends the session for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::AudioStream(_))
    }
}

impl From<cpal::DevicesError> for MeterError {
    fn from(err: cpal::DevicesError) -> Self {
        MeterError::SourceUnavailable(format!("Failed to enumerate devices: {}", err))
    }
}

impl From<cpal::DeviceNameError> for MeterError {
    fn from(err: cpal::DeviceNameError) -> Self {
        MeterError::SourceUnavailable(format!("Failed to get device name: {}", err))
    }
}

impl From<cpal::DefaultStreamConfigError> for MeterError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        MeterError::SourceUnavailable(format!("Failed to get default stream config: {}", err))
    }
}

impl From<cpal::BuildStreamError> for MeterError {
    fn from(err: cpal::BuildStreamError) -> Self {
        MeterError::AudioStream(format!("Failed to build audio stream: {}", err))
    }
}

impl From<cpal::PlayStreamError> for MeterError {
    fn from(err: cpal::PlayStreamError) -> Self {
        MeterError::AudioStream(format!("Failed to play audio stream: {}", err))
    }
}

impl From<hound::Error> for MeterError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => {
                MeterError::unavailable(format!("Failed to read audio file: {}", io))
            }
            other => MeterError::unavailable(format!("Failed to decode audio file: {}", other)),
        }
    }
}

/// Result type alias for application operations
pub type MeterResult<T> = Result<T, MeterError>;
