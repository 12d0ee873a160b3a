//! Errors surfaced by a file entity.

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum FileError {
    /// No registered engine can read the source format.
    #[error("No converters found for {file}")]
    NoConverters { file: String },

    /// Engines read the source but none can produce the target.
    #[error("No converter found for {from} to {to}")]
    NoConverterFound { from: String, to: String },

    #[error("{file} is already being converted")]
    AlreadyProcessing { file: String },

    #[error("Error converting {file}: {source}")]
    Conversion {
        file: String,
        #[source]
        source: EngineError,
    },

    #[error("Error cancelling {file}: {source}")]
    Cancel {
        file: String,
        #[source]
        source: EngineError,
    },
}

impl FileError {
    /// Stable kind for API responses and metrics.
    pub fn error_kind(&self) -> &str {
        match self {
            Self::NoConverters { .. } => "NoConverters",
            Self::NoConverterFound { .. } => "NoConverterFound",
            Self::AlreadyProcessing { .. } => "AlreadyProcessing",
            Self::Conversion { source, .. } | Self::Cancel { source, .. } => source.error_kind(),
        }
    }
}
