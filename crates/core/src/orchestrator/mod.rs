//! Conversion orchestrator.
//!
//! Owns the engine registry and every submitted file:
//! - **Submission**: creates a file entity with its candidate engines
//! - **Conversion**: runs in the background or awaited by the caller
//! - **Cancellation and discard**: forwarded to the engine in use

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::Orchestrator;
pub use types::{OrchestratorError, OrchestratorStatus};
