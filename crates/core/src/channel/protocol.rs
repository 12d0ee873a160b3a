//! Worker message shapes.
//!
//! ```text
//! Request:  { id, type: "convert", input: {bytes, name, from, to}, to, compression?, bitrate? }
//! Response: { id, type: "progress", value }
//!         | { id, type: "finished", output, zip? }
//!         | { id, type: "error", error, errorKind? }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Payload handed to a worker.
#[derive(Clone, Serialize, Deserialize)]
pub struct WorkerInput {
    pub bytes: Arc<[u8]>,
    pub name: String,
    pub from: String,
    pub to: String,
}

impl fmt::Debug for WorkerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInput")
            .field("len", &self.bytes.len())
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// Request body sent to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Convert {
        input: WorkerInput,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compression: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bitrate: Option<u32>,
    },
}

/// A request tagged with its correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: u64,
    #[serde(flatten)]
    pub message: WorkerMessage,
}

/// Events a worker emits for one request: any number of `progress`, then
/// exactly one `finished` or `error`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Progress {
        value: f32,
    },
    Finished {
        output: Arc<[u8]>,
        #[serde(default)]
        zip: bool,
    },
    Error {
        error: String,
        #[serde(
            rename = "errorKind",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        error_kind: Option<String>,
    },
}

impl WorkerEvent {
    /// Whether this event ends the request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

impl fmt::Debug for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress { value } => f.debug_struct("Progress").field("value", value).finish(),
            Self::Finished { output, zip } => f
                .debug_struct("Finished")
                .field("len", &output.len())
                .field("zip", zip)
                .finish(),
            Self::Error { error, error_kind } => f
                .debug_struct("Error")
                .field("error", error)
                .field("error_kind", error_kind)
                .finish(),
        }
    }
}

/// An event tagged with the correlation id of its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    #[serde(flatten)]
    pub event: WorkerEvent,
}
