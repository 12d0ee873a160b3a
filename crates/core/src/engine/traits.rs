//! The uniform adapter contract implemented by every engine.

use async_trait::async_trait;

use super::error::EngineError;
use super::status::EngineStatus;
use super::types::{ConversionJob, ConvertedFile, EngineKind, ProgressSink};
use crate::format::FormatDescriptor;

/// A codec engine wrapped behind one interface.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Stable identifier (e.g. `"ffmpeg"`).
    fn id(&self) -> &str;

    /// Engine family.
    fn kind(&self) -> EngineKind;

    /// Formats declared by this engine, in declaration order.
    fn supported_formats(&self) -> &[FormatDescriptor];

    /// Whether progress updates arrive before completion.
    fn reports_progress(&self) -> bool;

    /// Current readiness.
    fn status(&self) -> EngineStatus;

    fn is_ready(&self) -> bool {
        matches!(self.status(), EngineStatus::Ready)
    }

    /// Loads the underlying runtime. Marks the adapter ready on success and
    /// permanently unavailable on failure.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Converts `job.input` into `job.to`.
    ///
    /// The returned file carries the actual output format, which may differ
    /// from `job.to` when the engine emits an archive.
    async fn convert(
        &self,
        job: ConversionJob,
        progress: ProgressSink,
    ) -> Result<ConvertedFile, EngineError>;

    /// Cancels the in-flight conversion of `file_id`, if any.
    async fn cancel(&self, file_id: &str) -> Result<(), EngineError>;

    /// Descriptor for a normalized format name.
    fn descriptor(&self, format: &str) -> Option<&FormatDescriptor> {
        self.supported_formats().iter().find(|f| f.matches(format))
    }

    fn supports(&self, format: &str) -> bool {
        self.descriptor(format).is_some()
    }

    /// Whether `format` is declared as readable.
    fn can_read(&self, format: &str) -> bool {
        self.descriptor(format).is_some_and(|f| f.from_supported)
    }

    /// Whether `format` is declared as writable.
    fn can_write(&self, format: &str) -> bool {
        self.descriptor(format).is_some_and(|f| f.to_supported)
    }
}
