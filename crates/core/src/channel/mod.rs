//! Execution channel.
//!
//! Requests are tagged with a correlation id and served by a fresh worker
//! task each. Responses flow back through a correlation table: progress
//! events first, then exactly one terminal event. Every request has a
//! bounded wait, and its listener is removed on every exit path.

mod error;
mod pending;
mod protocol;
mod worker;

pub use error::ChannelError;
pub use pending::Dispatch;
pub use protocol::{WorkerEvent, WorkerInput, WorkerMessage, WorkerRequest, WorkerResponse};
pub use worker::{WorkerEvents, WorkerFailure, WorkerHandler, WorkerOutput};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::engine::ProgressSink;
use crate::metrics;
use pending::{PendingTable, Reply};

/// Request/response transport to isolated workers.
pub struct ExecutionChannel {
    name: String,
    handler: Arc<dyn WorkerHandler>,
    timeout: Duration,
    next_id: AtomicU64,
    pending: Arc<PendingTable>,
}

impl ExecutionChannel {
    pub fn new(name: impl Into<String>, handler: Arc<dyn WorkerHandler>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            handler,
            timeout,
            next_id: AtomicU64::new(1),
            pending: Arc::new(PendingTable::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts a request on a fresh worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, message: WorkerMessage, progress: ProgressSink) -> PendingRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, stop) = self.pending.register(id, progress);
        debug!(channel = %self.name, id, "Dispatching worker request");

        let handler = Arc::clone(&self.handler);
        let table = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let events = WorkerEvents::new(id, Arc::clone(&table));
            let outcome = tokio::select! {
                result = handler.handle(message, events) => result,
                _ = stop => Err(WorkerFailure::new("Cancelled", "worker stopped")),
            };

            let event = match outcome {
                Ok(WorkerOutput { output, zip }) => WorkerEvent::Finished { output, zip },
                Err(WorkerFailure { error, error_kind }) => WorkerEvent::Error { error, error_kind },
            };
            table.dispatch(WorkerResponse { id, event });
        });

        PendingRequest {
            id,
            reply,
            timeout: self.timeout,
            guard: ListenerGuard {
                id,
                table: Arc::clone(&self.pending),
            },
            channel: self.name.clone(),
        }
    }

    /// Submits a request and waits for its terminal response.
    pub async fn request(
        &self,
        message: WorkerMessage,
        progress: ProgressSink,
    ) -> Result<WorkerOutput, ChannelError> {
        self.submit(message, progress).response().await
    }

    /// Cancels request `id`. The waiter completes with
    /// [`ChannelError::Cancelled`]; late responses are swallowed.
    pub fn cancel(&self, id: u64) -> bool {
        let found = self.pending.abandon(id, Some(ChannelError::Cancelled));
        if found {
            debug!(channel = %self.name, id, "Cancelled worker request");
        }
        found
    }

    /// Number of requests still waiting for a terminal response.
    pub fn listener_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of cancelled or timed-out requests whose worker has not
    /// reported back yet.
    pub fn discarded_count(&self) -> usize {
        self.pending.discarded_len()
    }
}

impl std::fmt::Debug for ExecutionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionChannel")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("listeners", &self.pending.len())
            .finish()
    }
}

/// Removes the listener when the waiting side goes away.
struct ListenerGuard {
    id: u64,
    table: Arc<PendingTable>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.table.abandon(self.id, None);
    }
}

/// A submitted request awaiting its terminal response.
pub struct PendingRequest {
    id: u64,
    reply: oneshot::Receiver<Reply>,
    timeout: Duration,
    guard: ListenerGuard,
    channel: String,
}

impl PendingRequest {
    /// Correlation id of this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the terminal response, at most the channel timeout.
    pub async fn response(self) -> Result<WorkerOutput, ChannelError> {
        let PendingRequest {
            id,
            reply,
            timeout,
            guard,
            channel,
        } = self;

        let result = match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                warn!(channel = %channel, id, timeout_secs = timeout.as_secs(), "Worker request timed out");
                metrics::WORKER_TIMEOUTS
                    .with_label_values(&[channel.as_str()])
                    .inc();
                Err(ChannelError::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        };
        drop(guard);
        result
    }
}
