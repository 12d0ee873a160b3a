//! Mock engine adapter for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use crate::engine::{
    ConversionJob, ConvertedFile, EngineAdapter, EngineError, EngineKind, EngineStatus,
    ProgressSink, StatusCell,
};
use crate::format::FormatDescriptor;

#[derive(Debug, Clone)]
enum Outcome {
    Succeed(Vec<u8>),
    Archive(Vec<u8>),
    Fail { kind: String, message: String },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock implementation of the [`EngineAdapter`] trait.
///
/// Provides controllable behavior for testing:
/// - Declared formats
/// - Success, archive or failure outcomes
/// - A delay that [`EngineAdapter::cancel`] interrupts
/// - Progress values reported before completing
/// - Recorded conversions and cancellations
///
/// # Example
///
/// ```rust,ignore
/// use convertino_core::testing::MockEngine;
///
/// let engine = MockEngine::new("ffmpeg", EngineKind::TimedMedia)
///     .with_format("flac", true, true, true)
///     .with_format("mp3", true, true, true)
///     .with_delay(Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct MockEngine {
    id: String,
    kind: EngineKind,
    formats: Vec<FormatDescriptor>,
    status: StatusCell,
    outcome: Outcome,
    delay: Option<Duration>,
    progress: Vec<f32>,
    reports_progress: bool,
    init_failure: Option<String>,
    cancel_failure: Option<String>,
    calls: Mutex<Vec<ConversionJob>>,
    cancels: Mutex<Vec<String>>,
    cancelled: Mutex<HashSet<String>>,
    wake: Notify,
}

impl MockEngine {
    /// Bytes returned by a successful conversion unless configured otherwise.
    pub const OUTPUT: &'static [u8] = b"mock-engine-output";

    pub fn new(id: &str, kind: EngineKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            formats: Vec::new(),
            status: StatusCell::new(),
            outcome: Outcome::Succeed(Self::OUTPUT.to_vec()),
            delay: None,
            progress: Vec::new(),
            reports_progress: false,
            init_failure: None,
            cancel_failure: None,
            calls: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            cancelled: Mutex::new(HashSet::new()),
            wake: Notify::new(),
        }
    }

    /// Declares a format.
    pub fn with_format(mut self, name: &str, from: bool, to: bool, native: bool) -> Self {
        self.formats.push(if native {
            FormatDescriptor::new(name, from, to)
        } else {
            FormatDescriptor::non_native(name, from, to)
        });
        self
    }

    pub fn succeed_with(mut self, bytes: &[u8]) -> Self {
        self.outcome = Outcome::Succeed(bytes.to_vec());
        self
    }

    /// Returns `bytes` as a `.zip` result whatever the requested target.
    pub fn archive_output(mut self, bytes: &[u8]) -> Self {
        self.outcome = Outcome::Archive(bytes.to_vec());
        self
    }

    pub fn fail_with(mut self, kind: &str, message: &str) -> Self {
        self.outcome = Outcome::Fail {
            kind: kind.to_string(),
            message: message.to_string(),
        };
        self
    }

    /// Waits this long before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Progress values reported at the start of every conversion.
    pub fn with_progress(mut self, values: Vec<f32>) -> Self {
        self.progress = values;
        self.reports_progress = true;
        self
    }

    pub fn fail_init(mut self, reason: &str) -> Self {
        self.init_failure = Some(reason.to_string());
        self
    }

    pub fn fail_cancel(mut self, message: &str) -> Self {
        self.cancel_failure = Some(message.to_string());
        self
    }

    /// Jobs received so far.
    pub fn calls(&self) -> Vec<ConversionJob> {
        lock(&self.calls).clone()
    }

    /// File ids passed to `cancel` so far.
    pub fn cancels(&self) -> Vec<String> {
        lock(&self.cancels).clone()
    }

    fn take_cancelled(&self, file_id: &str) -> bool {
        lock(&self.cancelled).remove(file_id)
    }

    async fn wait(&self, file_id: &str) -> Result<(), EngineError> {
        let Some(delay) = self.delay else {
            return Ok(());
        };
        let deadline = tokio::time::Instant::now() + delay;

        loop {
            let woken = self.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            if self.take_cancelled(file_id) {
                return Err(EngineError::Cancelled);
            }
            tokio::select! {
                _ = &mut woken => continue,
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn supported_formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    fn reports_progress(&self) -> bool {
        self.reports_progress
    }

    fn status(&self) -> EngineStatus {
        self.status.get()
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        match &self.init_failure {
            Some(reason) => {
                self.status.mark_failed(reason.clone());
                Err(EngineError::unavailable(&self.id, reason.clone()))
            }
            None => {
                self.status.mark_ready();
                Ok(())
            }
        }
    }

    async fn convert(
        &self,
        job: ConversionJob,
        progress: ProgressSink,
    ) -> Result<ConvertedFile, EngineError> {
        self.status.ensure_available(&self.id)?;
        if !self.can_write(&job.to) {
            return Err(EngineError::UnsupportedFormat {
                format: job.to.clone(),
            });
        }

        lock(&self.cancelled).remove(&job.file_id);
        lock(&self.calls).push(job.clone());

        for value in &self.progress {
            progress.report(*value);
        }
        self.wait(&job.file_id).await?;

        match &self.outcome {
            Outcome::Succeed(bytes) => Ok(ConvertedFile::new(&job.input, &job.to, bytes.clone())),
            Outcome::Archive(bytes) => Ok(ConvertedFile::new(&job.input, ".zip", bytes.clone())),
            Outcome::Fail { kind, message } => Err(EngineError::conversion(kind, message)),
        }
    }

    async fn cancel(&self, file_id: &str) -> Result<(), EngineError> {
        lock(&self.cancels).push(file_id.to_string());
        if let Some(message) = &self.cancel_failure {
            return Err(EngineError::conversion("CancelFailed", message.clone()));
        }
        lock(&self.cancelled).insert(file_id.to_string());
        self.wake.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceFile;
    use std::sync::Arc;

    fn job(file_id: &str) -> ConversionJob {
        ConversionJob::new(file_id, SourceFile::new("a.png", vec![1]), "jpg")
    }

    fn engine() -> MockEngine {
        MockEngine::new("image", EngineKind::Raster)
            .with_format("png", true, true, true)
            .with_format("jpg", true, true, true)
    }

    #[tokio::test]
    async fn test_records_calls() {
        let engine = engine().succeed_with(b"jpeg");
        let out = engine.convert(job("f1"), ProgressSink::noop()).await.unwrap();
        assert_eq!(out.name, "a.jpg");
        assert_eq!(&*out.bytes, b"jpeg");
        assert_eq!(engine.calls()[0].file_id, "f1");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let engine = Arc::new(engine().with_delay(Duration::from_secs(60)));
        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.convert(job("f1"), ProgressSink::noop()).await }
        });
        while engine.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        tokio_test::assert_ok!(engine.cancel("f1").await);
        assert!(running.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(engine.cancels(), vec!["f1"]);
    }

    #[tokio::test]
    async fn test_failed_init_makes_engine_unavailable() {
        let engine = engine().fail_init("no binary");
        tokio_test::assert_err!(engine.initialize().await);
        let err = engine.convert(job("f1"), ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "EngineUnavailable");
    }
}
