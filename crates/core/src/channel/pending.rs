//! Correlation table matching worker responses to waiting requests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::ChannelError;
use super::protocol::{WorkerEvent, WorkerResponse};
use super::worker::WorkerOutput;
use crate::engine::ProgressSink;

pub(crate) type Reply = Result<WorkerOutput, ChannelError>;

struct Listener {
    progress: ProgressSink,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Inner {
    listeners: HashMap<u64, Listener>,
    /// Stop signals of workers that have not posted a terminal event yet.
    workers: HashMap<u64, oneshot::Sender<()>>,
    /// Ids whose remaining responses must be swallowed.
    discarded: HashSet<u64>,
}

/// What happened to a dispatched response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    Swallowed,
    Unknown,
}

#[derive(Default)]
pub(crate) struct PendingTable {
    inner: Mutex<Inner>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a listener and a running worker for `id`.
    pub fn register(
        &self,
        id: u64,
        progress: ProgressSink,
    ) -> (oneshot::Receiver<Reply>, oneshot::Receiver<()>) {
        let (reply, reply_rx) = oneshot::channel();
        let (stop, stop_rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.listeners.insert(id, Listener { progress, reply });
        inner.workers.insert(id, stop);
        (reply_rx, stop_rx)
    }

    /// Routes a worker response to its listener.
    pub fn dispatch(&self, response: WorkerResponse) -> Dispatch {
        let WorkerResponse { id, event } = response;

        let reply = match event {
            WorkerEvent::Progress { value } => return self.deliver_progress(id, value),
            WorkerEvent::Finished { output, zip } => Ok(WorkerOutput { output, zip }),
            WorkerEvent::Error { error, error_kind } => {
                Err(ChannelError::Worker { error, error_kind })
            }
        };

        let listener = {
            let mut inner = self.lock();
            inner.workers.remove(&id);
            match inner.listeners.remove(&id) {
                Some(listener) => listener,
                None if inner.discarded.remove(&id) => {
                    debug!(id, "Swallowed response for discarded request");
                    return Dispatch::Swallowed;
                }
                None => {
                    warn!(id, "Response for unknown request dropped");
                    return Dispatch::Unknown;
                }
            }
        };

        // The waiter may already be gone; nothing to do then.
        let _ = listener.reply.send(reply);
        Dispatch::Delivered
    }

    fn deliver_progress(&self, id: u64, value: f32) -> Dispatch {
        let sink = {
            let inner = self.lock();
            match inner.listeners.get(&id) {
                Some(listener) => listener.progress.clone(),
                None if inner.discarded.contains(&id) => return Dispatch::Swallowed,
                None => {
                    warn!(id, "Progress for unknown request dropped");
                    return Dispatch::Unknown;
                }
            }
        };
        sink.report(value);
        Dispatch::Delivered
    }

    /// Tears down the listener for `id`. If its worker is still running, the
    /// worker is told to stop and its remaining responses are swallowed.
    /// With `reason`, the waiter (if still registered) is completed with it.
    pub fn abandon(&self, id: u64, reason: Option<ChannelError>) -> bool {
        let (listener, stop) = {
            let mut inner = self.lock();
            let listener = inner.listeners.remove(&id);
            let stop = inner.workers.remove(&id);
            if stop.is_some() {
                inner.discarded.insert(id);
            }
            (listener, stop)
        };

        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        let found = listener.is_some();
        if let (Some(listener), Some(reason)) = (listener, reason) {
            let _ = listener.reply.send(Err(reason));
        }
        found
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of ids still waiting for a late terminal response.
    pub fn discarded_len(&self) -> usize {
        self.lock().discarded.len()
    }
}
