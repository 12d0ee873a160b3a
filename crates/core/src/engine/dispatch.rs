//! Routes adapter calls through an execution channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::EngineError;
use super::types::{ConversionJob, ProgressSink};
use crate::channel::{
    ExecutionChannel, WorkerHandler, WorkerInput, WorkerMessage, WorkerOutput,
};

/// Tracks which correlation id serves which file so `cancel` can find it.
pub struct WorkerDispatcher {
    channel: ExecutionChannel,
    active: Mutex<HashMap<String, u64>>,
}

impl WorkerDispatcher {
    pub fn new(name: &str, handler: Arc<dyn WorkerHandler>, timeout: Duration) -> Self {
        Self {
            channel: ExecutionChannel::new(name, handler, timeout),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel(&self) -> &ExecutionChannel {
        &self.channel
    }

    /// Builds the wire message for `job` and waits for the worker's answer.
    pub async fn run(
        &self,
        job: &ConversionJob,
        progress: ProgressSink,
    ) -> Result<WorkerOutput, EngineError> {
        let pending = self.channel.submit(message_for(job), progress);
        let id = pending.id();
        self.lock().insert(job.file_id.clone(), id);

        let result = pending.response().await;

        let mut active = self.lock();
        if active.get(&job.file_id) == Some(&id) {
            active.remove(&job.file_id);
        }
        drop(active);

        result.map_err(EngineError::from)
    }

    /// Cancels the request serving `file_id`. Returns whether one was found.
    pub fn cancel(&self, file_id: &str) -> bool {
        let id = self.lock().remove(file_id);
        match id {
            Some(id) => self.channel.cancel(id),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The `convert` request for a job.
pub fn message_for(job: &ConversionJob) -> WorkerMessage {
    WorkerMessage::Convert {
        input: WorkerInput {
            bytes: Arc::clone(&job.input.bytes),
            name: job.input.name.clone(),
            from: job.input.format.clone(),
            to: job.to.clone(),
        },
        to: job.to.clone(),
        compression: job.options.quality,
        bitrate: job.options.bitrate_kbps,
    }
}
