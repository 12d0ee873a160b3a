//! The worker side of the execution channel.

use async_trait::async_trait;
use std::sync::Arc;

use super::pending::PendingTable;
use super::protocol::{WorkerEvent, WorkerMessage, WorkerResponse};

/// Terminal success of a worker.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub output: Arc<[u8]>,
    /// Whether `output` is a zip archive rather than a single file.
    pub zip: bool,
}

impl WorkerOutput {
    pub fn single(output: impl Into<Arc<[u8]>>) -> Self {
        Self {
            output: output.into(),
            zip: false,
        }
    }

    pub fn archive(output: impl Into<Arc<[u8]>>) -> Self {
        Self {
            output: output.into(),
            zip: true,
        }
    }
}

/// Terminal failure of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub error: String,
    pub error_kind: Option<String>,
}

impl WorkerFailure {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_kind: Some(kind.into()),
        }
    }

    /// A failure without a kind.
    pub fn untyped(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_kind: None,
        }
    }
}

impl From<std::io::Error> for WorkerFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new("IoError", err.to_string())
    }
}

/// Progress emitter handed to a worker for the duration of one request.
#[derive(Clone)]
pub struct WorkerEvents {
    id: u64,
    table: Arc<PendingTable>,
}

impl WorkerEvents {
    pub(crate) fn new(id: u64, table: Arc<PendingTable>) -> Self {
        Self { id, table }
    }

    /// Correlation id of the request being served.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Emits a `progress` event.
    pub fn progress(&self, value: f32) {
        self.table.dispatch(WorkerResponse {
            id: self.id,
            event: WorkerEvent::Progress { value },
        });
    }
}

/// Serves one request at a time inside a fresh worker task.
///
/// A handler must not keep state between calls: every request gets its own
/// scratch space, which is torn down when `handle` returns or is dropped.
#[async_trait]
pub trait WorkerHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        message: WorkerMessage,
        events: WorkerEvents,
    ) -> Result<WorkerOutput, WorkerFailure>;
}
