//! A file submitted for conversion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::error::FileError;
use super::filename;
use super::notify::Notifier;
use crate::engine::{ConversionJob, ConvertedFile, EngineAdapter, EngineOptions, ProgressSink, SourceFile};
use crate::format::{normalize_format, Registry};
use crate::metrics;
use crate::resolver::resolve_pair;

/// Observable conversion state of a [`FileEntity`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileState {
    /// 0 to 100.
    pub progress: f32,
    pub processing: bool,
    pub cancelled: bool,
    pub result: Option<Arc<ConvertedFile>>,
}

/// Serializable view of a file for the host.
#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    pub id: String,
    pub name: String,
    pub from: String,
    pub to: String,
    pub size_bytes: usize,
    pub candidates: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: FileState,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears `processing` and the active adapter however `convert` exits.
struct ProcessingGuard<'a> {
    file: &'a FileEntity,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.file.active).take();
        self.file.state.send_modify(|state| state.processing = false);
    }
}

/// One source file, its target format and its conversion state.
///
/// The source never changes after construction; the target may. At most one
/// conversion runs at a time.
pub struct FileEntity {
    id: String,
    source: SourceFile,
    target: RwLock<String>,
    candidates: Vec<Arc<dyn EngineAdapter>>,
    state: Arc<watch::Sender<FileState>>,
    notifier: Arc<dyn Notifier>,
    active: Mutex<Option<Arc<dyn EngineAdapter>>>,
    created_at: DateTime<Utc>,
}

impl FileEntity {
    /// Creates an entity and snapshots the engines able to read its format.
    pub fn new(
        name: &str,
        bytes: impl Into<Arc<[u8]>>,
        to: &str,
        registry: &Registry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let source = SourceFile::new(name, bytes);
        let candidates = registry
            .declaring(&source.format)
            .into_iter()
            .filter(|adapter| adapter.can_read(&source.format))
            .collect();
        let (state, _rx) = watch::channel(FileState::default());

        Self {
            id: Uuid::new_v4().to_string(),
            source,
            target: RwLock::new(normalize_format(to)),
            candidates,
            state: Arc::new(state),
            notifier,
            active: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn target(&self) -> String {
        self.target
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Changes the target format. Source and state are left alone.
    pub fn set_target(&self, to: &str) {
        *self
            .target
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = normalize_format(to);
    }

    pub fn candidates(&self) -> &[Arc<dyn EngineAdapter>] {
        &self.candidates
    }

    pub fn state(&self) -> FileState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FileState> {
        self.state.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.state.borrow().processing
    }

    pub fn result(&self) -> Option<Arc<ConvertedFile>> {
        self.state.borrow().result.clone()
    }

    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            id: self.id.clone(),
            name: self.source.name.clone(),
            from: self.source.format.clone(),
            to: self.target(),
            size_bytes: self.source.len(),
            candidates: self.candidates.iter().map(|a| a.id().to_string()).collect(),
            created_at: self.created_at,
            state: self.state(),
        }
    }

    /// Converts the source into the current target.
    ///
    /// Returns `Ok(None)` when the conversion was cancelled. Failures other
    /// than cancellation are also pushed to the notifier.
    pub async fn convert(
        &self,
        options: EngineOptions,
    ) -> Result<Option<Arc<ConvertedFile>>, FileError> {
        if self.candidates.is_empty() {
            return Err(FileError::NoConverters {
                file: self.source.name.clone(),
            });
        }

        let to = self.target();
        let adapter = resolve_pair(&self.candidates, &self.source.format, &to).ok_or_else(|| {
            FileError::NoConverterFound {
                from: self.source.format.clone(),
                to: to.clone(),
            }
        })?;

        {
            let mut active = lock(&self.active);
            let started = self.state.send_if_modified(|state| {
                if state.processing {
                    return false;
                }
                *state = FileState {
                    processing: true,
                    ..FileState::default()
                };
                true
            });
            if !started {
                return Err(FileError::AlreadyProcessing {
                    file: self.source.name.clone(),
                });
            }
            *active = Some(Arc::clone(&adapter));
        }
        let _guard = ProcessingGuard { file: self };

        info!(
            file = %self.source.name,
            from = %self.source.format,
            to = %to,
            engine = adapter.id(),
            "Starting conversion"
        );

        let state = Arc::clone(&self.state);
        let progress = ProgressSink::new(move |percent| {
            state.send_if_modified(|state| {
                if !state.processing || state.cancelled {
                    return false;
                }
                state.progress = percent;
                true
            });
        });

        let job = ConversionJob::new(self.id.clone(), self.source.clone(), &to).with_options(options);
        let started_at = Instant::now();
        let outcome = adapter.convert(job, progress).await;
        metrics::CONVERSION_DURATION
            .with_label_values(&[adapter.id()])
            .observe(started_at.elapsed().as_secs_f64());

        let cancelled = self.state.borrow().cancelled;
        match outcome {
            Ok(result) if !cancelled => {
                let result = Arc::new(result);
                self.state.send_modify(|state| {
                    state.result = Some(Arc::clone(&result));
                    state.progress = 100.0;
                });
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[adapter.id(), "success"])
                    .inc();
                info!(
                    file = %self.source.name,
                    output = %result.name,
                    size_bytes = result.size_bytes,
                    "Conversion finished"
                );
                Ok(Some(result))
            }
            Err(e) if !cancelled && !e.is_cancelled() => {
                self.state.send_modify(|state| state.result = None);
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[adapter.id(), "failed"])
                    .inc();
                error!(file = %self.source.name, kind = e.error_kind(), error = %e, "Conversion failed");
                self.notifier
                    .error(format!("Error converting {}: {}", self.source.name, e));
                Err(FileError::Conversion {
                    file: self.source.name.clone(),
                    source: e,
                })
            }
            _ => {
                self.state.send_modify(|state| state.result = None);
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[adapter.id(), "cancelled"])
                    .inc();
                debug!(file = %self.source.name, "Conversion cancelled");
                Ok(None)
            }
        }
    }

    /// Cancels the running conversion. Does nothing when idle.
    pub async fn cancel(&self) -> Result<(), FileError> {
        let marked = self.state.send_if_modified(|state| {
            if !state.processing || state.cancelled {
                return false;
            }
            state.cancelled = true;
            true
        });
        if !marked {
            return Ok(());
        }

        let adapter = lock(&self.active).clone();
        let Some(adapter) = adapter else {
            return Ok(());
        };

        info!(file = %self.source.name, engine = adapter.id(), "Cancelling conversion");
        adapter.cancel(&self.id).await.map_err(|e| {
            self.notifier
                .error(format!("Error cancelling {}: {}", self.source.name, e));
            FileError::Cancel {
                file: self.source.name.clone(),
                source: e,
            }
        })
    }

    /// File name for downloading the result, or `None` without a result.
    pub fn download_name(&self, template: &str, now: DateTime<Utc>) -> Option<String> {
        let result = self.result()?;
        let base = filename::render(template, self.source.stem(), self.source.extension(), now);
        Some(format!("{}{}", base, result.format))
    }
}

impl std::fmt::Debug for FileEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntity")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("target", &self.target())
            .finish()
    }
}
