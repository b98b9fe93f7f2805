//! Error types for pipeplay
//!
//! The first group of variants is the playback taxonomy surfaced to the GUI:
//! every engine failure is classified into exactly one of them. The second
//! group covers misuse of the control API and local I/O.

use thiserror::Error;

/// Main error type for pipeplay
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The locator does not resolve to anything
    #[error("Location not found: {0}")]
    ResourceNotFound(String),

    /// The resource exists but cannot be read
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The remote host cannot be reached
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The remote host refused the connection
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The container or stream type is not recognised
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A decoder or demuxer needed for the resource is not installed
    #[error("Missing codec: {0}")]
    CodecMissing(String),

    /// An output device is held by another application
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// The resource is encrypted and cannot be decoded
    #[error("Encrypted source: {0}")]
    EncryptedSource(String),

    /// Any other engine failure
    #[error("Playback error: {0}")]
    Generic(String),

    /// `open` was called while a resource is open
    #[error("A resource is already open; close it first")]
    AlreadyOpen,

    /// The operation needs an open resource
    #[error("No resource is open")]
    NotOpen,

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A blocking wait was cancelled from another thread
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),
}

impl PlayerError {
    /// Create a generic playback error from string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        PlayerError::Generic(msg.into())
    }

    /// Whether this error belongs to the playback taxonomy, as opposed to
    /// an API misuse or local I/O failure.
    pub fn is_fatal_kind(&self) -> bool {
        matches!(
            self,
            PlayerError::ResourceNotFound(_)
                | PlayerError::PermissionDenied(_)
                | PlayerError::NetworkUnreachable(_)
                | PlayerError::ConnectionRefused(_)
                | PlayerError::UnsupportedFormat(_)
                | PlayerError::CodecMissing(_)
                | PlayerError::DeviceBusy(_)
                | PlayerError::EncryptedSource(_)
                | PlayerError::Generic(_)
        )
    }

    /// The bare human-readable message, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            PlayerError::ResourceNotFound(m)
            | PlayerError::PermissionDenied(m)
            | PlayerError::NetworkUnreachable(m)
            | PlayerError::ConnectionRefused(m)
            | PlayerError::UnsupportedFormat(m)
            | PlayerError::CodecMissing(m)
            | PlayerError::DeviceBusy(m)
            | PlayerError::EncryptedSource(m)
            | PlayerError::Generic(m)
            | PlayerError::InvalidInput(m)
            | PlayerError::Interrupted(m)
            | PlayerError::Config(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for Results in pipeplay
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn config_err(self, context: &str) -> Result<T>;
    fn engine_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }

    fn engine_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Generic(format!("{}: {}", context, e)))
    }
}
