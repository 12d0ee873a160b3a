//! Types for the conversion orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::file::FileError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// File not found.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The file has no converted result to download.
    #[error("file {0} has no result yet")]
    NoResult(String),

    #[error(transparent)]
    File(#[from] FileError),
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStatus {
    /// Files currently tracked.
    pub files: usize,
    /// Files with a conversion in flight.
    pub processing: usize,
    /// Engines that finished initializing.
    pub engines_ready: usize,
    /// Engines that failed to initialize.
    pub engines_failed: usize,
}
