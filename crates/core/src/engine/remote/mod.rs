//! Remote-job engine: video conversion offloaded to an HTTP job service.

mod client;

pub use client::{HttpJobClient, JobStatus, JobTicket, RemoteJobApi, RemoteJobError};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::error::EngineError;
use super::media::ContainerFormat;
use super::status::{EngineStatus, StatusCell};
use super::traits::EngineAdapter;
use super::types::{ConversionJob, ConvertedFile, EngineKind, ProgressSink};
use crate::config::RemoteEngineConfig;
use crate::format::FormatDescriptor;
use crate::metrics;

pub const ENGINE_ID: &str = "remote";

impl From<RemoteJobError> for EngineError {
    fn from(err: RemoteJobError) -> Self {
        match err {
            RemoteJobError::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            other => Self::conversion(other.error_kind(), other.to_string()),
        }
    }
}

/// Video containers, all converted natively by the service.
pub fn descriptors() -> Vec<FormatDescriptor> {
    ContainerFormat::ALL
        .iter()
        .map(|c| FormatDescriptor::new(c.extension(), true, true))
        .collect()
}

/// Bookkeeping for one in-flight job.
#[derive(Default)]
struct ActiveJob {
    ticket: Option<JobTicket>,
    cancelled: bool,
    wake: Arc<Notify>,
}

/// Removes the job entry when `convert` returns or is dropped.
struct ActiveGuard<'a> {
    jobs: &'a Mutex<HashMap<String, ActiveJob>>,
    file_id: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        lock(self.jobs).remove(self.file_id);
    }
}

fn lock(jobs: &Mutex<HashMap<String, ActiveJob>>) -> MutexGuard<'_, HashMap<String, ActiveJob>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Adapter driving jobs on a [`RemoteJobApi`].
pub struct RemoteAdapter {
    formats: Vec<FormatDescriptor>,
    status: StatusCell,
    api: Arc<dyn RemoteJobApi>,
    poll_interval: Duration,
    timeout: Duration,
    jobs: Mutex<HashMap<String, ActiveJob>>,
}

impl RemoteAdapter {
    /// Creates an adapter talking HTTP to `config.url`.
    pub fn new(config: &RemoteEngineConfig) -> Result<Self, RemoteJobError> {
        Ok(Self::with_api(config, Arc::new(HttpJobClient::new(config)?)))
    }

    pub fn with_api(config: &RemoteEngineConfig, api: Arc<dyn RemoteJobApi>) -> Self {
        Self {
            formats: descriptors(),
            status: StatusCell::new(),
            api,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of jobs currently tracked.
    pub fn active_jobs(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// Submits the job and polls it to completion.
    async fn drive(
        &self,
        job: &ConversionJob,
        progress: &ProgressSink,
        wake: &Notify,
    ) -> Result<ConvertedFile, EngineError> {
        let ticket = self.api.submit(&job.input, &job.to).await?;

        let cancelled = {
            let mut jobs = lock(&self.jobs);
            match jobs.get_mut(&job.file_id) {
                Some(active) => {
                    active.ticket = Some(ticket.clone());
                    active.cancelled
                }
                None => false,
            }
        };
        if cancelled {
            // Cancelled while uploading; nobody has aborted the job yet.
            if let Err(e) = self.api.abort(&ticket).await {
                warn!(job = %ticket.id, error = %e, "Failed to abort cancelled job");
            }
            return Err(EngineError::Cancelled);
        }

        loop {
            tokio::select! {
                _ = wake.notified() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            match self.api.poll(&ticket).await? {
                JobStatus::Queued => progress.report(0.0),
                JobStatus::Running { progress: value } => progress.report(value),
                JobStatus::Completed => {
                    let bytes = self.api.fetch(&ticket).await?;
                    debug!(job = %ticket.id, size = bytes.len(), "Fetched remote artifact");
                    return Ok(ConvertedFile::new(&job.input, &job.to, bytes));
                }
                JobStatus::Failed { kind, message } => {
                    return Err(match kind {
                        Some(kind) => EngineError::conversion(kind, message),
                        None => EngineError::rejected("RemoteJobError", message),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl EngineAdapter for RemoteAdapter {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn kind(&self) -> EngineKind {
        EngineKind::RemoteJob
    }

    fn supported_formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    fn reports_progress(&self) -> bool {
        true
    }

    fn status(&self) -> EngineStatus {
        self.status.get()
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        match self.api.health().await {
            Ok(version) => {
                self.status.mark_ready();
                info!(engine = ENGINE_ID, %version, "Engine ready");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(engine = ENGINE_ID, error = %reason, "Engine failed to start");
                self.status.mark_failed(reason.clone());
                Err(EngineError::unavailable(ENGINE_ID, reason))
            }
        }
    }

    async fn convert(
        &self,
        job: ConversionJob,
        progress: ProgressSink,
    ) -> Result<ConvertedFile, EngineError> {
        self.status.ensure_available(ENGINE_ID)?;
        if !self.can_read(&job.input.format) {
            return Err(EngineError::UnsupportedFormat {
                format: job.input.format.clone(),
            });
        }
        if !self.can_write(&job.to) {
            return Err(EngineError::UnsupportedFormat {
                format: job.to.clone(),
            });
        }

        let wake = Arc::new(Notify::new());
        lock(&self.jobs).insert(
            job.file_id.clone(),
            ActiveJob {
                wake: Arc::clone(&wake),
                ..ActiveJob::default()
            },
        );
        let _guard = ActiveGuard {
            jobs: &self.jobs,
            file_id: &job.file_id,
        };

        match tokio::time::timeout(self.timeout, self.drive(&job, &progress, &wake)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_secs = self.timeout.as_secs();
                warn!(engine = ENGINE_ID, file = %job.input.name, timeout_secs, "Remote job timed out");
                metrics::WORKER_TIMEOUTS
                    .with_label_values(&[ENGINE_ID])
                    .inc();

                let ticket = lock(&self.jobs)
                    .get(&job.file_id)
                    .and_then(|active| active.ticket.clone());
                if let Some(ticket) = ticket {
                    if let Err(e) = self.api.abort(&ticket).await {
                        warn!(job = %ticket.id, error = %e, "Failed to abort timed out job");
                    }
                }
                Err(RemoteJobError::Timeout { timeout_secs }.into())
            }
        }
    }

    async fn cancel(&self, file_id: &str) -> Result<(), EngineError> {
        let ticket = {
            let mut jobs = lock(&self.jobs);
            let Some(active) = jobs.get_mut(file_id) else {
                return Ok(());
            };
            active.cancelled = true;
            active.wake.notify_one();
            active.ticket.clone()
        };

        if let Some(ticket) = ticket {
            debug!(engine = ENGINE_ID, job = %ticket.id, "Aborting remote job");
            self.api.abort(&ticket).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::SourceFile;
    use std::collections::VecDeque;

    /// Plays back a fixed sequence of statuses; the last one repeats.
    struct ScriptedApi {
        statuses: Mutex<VecDeque<JobStatus>>,
        calls: Mutex<Vec<String>>,
        healthy: bool,
    }

    impl ScriptedApi {
        fn new(statuses: Vec<JobStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                calls: Mutex::new(Vec::new()),
                healthy: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl RemoteJobApi for ScriptedApi {
        async fn health(&self) -> Result<String, RemoteJobError> {
            if self.healthy {
                Ok("1.0.0".to_string())
            } else {
                Err(RemoteJobError::Api {
                    status: 503,
                    message: "down".to_string(),
                })
            }
        }

        async fn submit(&self, _input: &SourceFile, to: &str) -> Result<JobTicket, RemoteJobError> {
            self.record(&format!("submit {}", to));
            Ok(JobTicket {
                id: "job-1".to_string(),
                token: "secret".to_string(),
            })
        }

        async fn poll(&self, _ticket: &JobTicket) -> Result<JobStatus, RemoteJobError> {
            self.record("poll");
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            };
            Ok(status.unwrap_or(JobStatus::Queued))
        }

        async fn fetch(&self, _ticket: &JobTicket) -> Result<Vec<u8>, RemoteJobError> {
            self.record("fetch");
            Ok(b"webm-bytes".to_vec())
        }

        async fn abort(&self, ticket: &JobTicket) -> Result<(), RemoteJobError> {
            self.record(&format!("abort {}", ticket.id));
            Ok(())
        }
    }

    fn config() -> RemoteEngineConfig {
        RemoteEngineConfig {
            url: "http://jobs.test".to_string(),
            timeout_secs: 30,
            poll_interval_ms: 100,
            request_timeout_secs: 5,
        }
    }

    fn job() -> ConversionJob {
        ConversionJob::new("f1", SourceFile::new("clip.mkv", vec![0u8; 16]), "webm")
    }

    async fn adapter(api: Arc<ScriptedApi>) -> RemoteAdapter {
        let adapter = RemoteAdapter::with_api(&config(), api);
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_to_completion() {
        let api = Arc::new(ScriptedApi::new(vec![
            JobStatus::Queued,
            JobStatus::Running { progress: 40.0 },
            JobStatus::Completed,
        ]));
        let adapter = adapter(Arc::clone(&api)).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            ProgressSink::new(move |p| seen.lock().unwrap().push(p))
        };
        let out = adapter.convert(job(), sink).await.unwrap();

        assert_eq!(out.name, "clip.webm");
        assert_eq!(&*out.bytes, b"webm-bytes");
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 40.0]);
        assert_eq!(api.calls(), vec!["submit .webm", "poll", "poll", "poll", "fetch"]);
        assert_eq!(adapter.active_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_keeps_kind() {
        let api = Arc::new(ScriptedApi::new(vec![JobStatus::Failed {
            kind: Some("DecodeError".to_string()),
            message: "corrupt stream".to_string(),
        }]));
        let adapter = adapter(api).await;

        let err = adapter.convert(job(), ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "DecodeError");
        assert_eq!(err.to_string(), "DecodeError: corrupt stream");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_remote_job() {
        let api = Arc::new(ScriptedApi::new(vec![JobStatus::Running { progress: 10.0 }]));
        let adapter = Arc::new(adapter(Arc::clone(&api)).await);

        let running = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.convert(job(), ProgressSink::noop()).await })
        };
        while !api.calls().iter().any(|c| c == "poll") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        adapter.cancel("f1").await.unwrap();
        let err = running.await.unwrap().unwrap_err();

        assert!(err.is_cancelled());
        let aborts = api.calls().iter().filter(|c| c.starts_with("abort")).count();
        assert_eq!(aborts, 1);
        assert_eq!(adapter.active_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_remote_job() {
        let api = Arc::new(ScriptedApi::new(vec![JobStatus::Running { progress: 5.0 }]));
        let adapter = adapter(Arc::clone(&api)).await;

        let err = adapter.convert(job(), ProgressSink::noop()).await.unwrap_err();

        assert_eq!(err.error_kind(), "Timeout");
        assert!(api.calls().contains(&"abort job-1".to_string()));
        assert_eq!(adapter.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_cancel_without_job_is_noop() {
        let adapter = adapter(Arc::new(ScriptedApi::new(Vec::new()))).await;
        adapter.cancel("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_unhealthy_service_marks_engine_failed() {
        let mut api = ScriptedApi::new(Vec::new());
        api.healthy = false;
        let adapter = RemoteAdapter::with_api(&config(), Arc::new(api));

        assert!(adapter.initialize().await.is_err());
        let err = adapter.convert(job(), ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "EngineUnavailable");
    }

    #[test]
    fn test_formats_are_native_video() {
        let formats = descriptors();
        assert_eq!(formats.len(), 9);
        assert!(formats.iter().all(|f| f.is_native));
        assert!(formats.iter().any(|f| f.name == ".m2ts"));
    }
}
