//! Error types for the ffmpeg toolchain.

use std::path::PathBuf;
use thiserror::Error;

use crate::channel::WorkerFailure;

/// Errors that can occur while running ffmpeg or ffprobe.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// The ffmpeg process exited unsuccessfully.
    #[error("FFmpeg failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },

    /// I/O error while staging files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolchainError {
    /// Creates a failed error with stderr output.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Captured stderr, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// Whether ffmpeg reported that a stream mapping selected nothing.
    pub fn is_missing_stream(&self) -> bool {
        self.stderr()
            .is_some_and(|stderr| stderr.contains("matches no streams"))
    }
}

impl From<ToolchainError> for WorkerFailure {
    fn from(err: ToolchainError) -> Self {
        let kind = match &err {
            ToolchainError::FfmpegNotFound { .. } | ToolchainError::FfprobeNotFound { .. } => {
                "ToolNotFound"
            }
            ToolchainError::Failed { .. } => "FfmpegError",
            ToolchainError::ProbeFailed { .. } | ToolchainError::ParseError { .. } => "ProbeError",
            ToolchainError::Io(_) => "IoError",
        };
        WorkerFailure::new(kind, err.to_string())
    }
}
