//! Error types for engine adapters.

use thiserror::Error;

use crate::channel::ChannelError;

/// Errors surfaced by an engine adapter.
///
/// Every variant carries an error kind (see [`EngineError::error_kind`]) so the
/// host can distinguish failures without parsing messages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine failed to initialize and is permanently unavailable.
    #[error("{engine} is unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    /// The engine rejected the conversion with a kind it did not map.
    #[error("{kind}: {message}")]
    Conversion { kind: String, message: String },

    /// The engine rejected the conversion with a recognized kind; the message
    /// is already user-facing.
    #[error("{message}")]
    Rejected { kind: String, message: String },

    /// No response arrived within the configured bound.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The conversion was cancelled by the user.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The engine was asked for a format it does not declare.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// I/O error while staging input or reading output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates an unmapped conversion error.
    pub fn conversion(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates a conversion error with a user-facing message.
    pub fn rejected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable kind of this error.
    pub fn error_kind(&self) -> &str {
        match self {
            Self::Unavailable { .. } => "EngineUnavailable",
            Self::Conversion { kind, .. } | Self::Rejected { kind, .. } => kind,
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::UnsupportedFormat { .. } => "UnsupportedFormat",
            Self::Io(_) => "IoError",
        }
    }

    /// Whether this error stems from a user cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ChannelError> for EngineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            ChannelError::Cancelled => Self::Cancelled,
            ChannelError::Closed => Self::conversion("WorkerClosed", "worker exited without a response"),
            ChannelError::Worker {
                error,
                error_kind: Some(kind),
            } => Self::Conversion {
                kind,
                message: error,
            },
            ChannelError::Worker {
                error,
                error_kind: None,
            } => Self::Rejected {
                kind: "WorkerError".to_string(),
                message: error,
            },
        }
    }
}
