//! Timed-media engine backed by ffmpeg.
//!
//! Each request stages its input in a fresh scratch directory, probes it
//! with ffprobe, then runs one or more ffmpeg passes. The directory is
//! removed when the request finishes, fails, or is abandoned.

mod error;
mod formats;
mod plan;
mod toolchain;

pub use error::ToolchainError;
pub use formats::{descriptors, AudioFormat, ContainerFormat, MediaFormat};
pub use plan::{plan_kind, resolve_bitrate, CommandOptions, PlanKind, UNCOMPRESSED_SOURCE_KBPS};
pub use toolchain::{parse_probe_output, FfmpegToolchain, MediaInfo, MediaToolchain, ProgressFn};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dispatch::WorkerDispatcher;
use super::error::EngineError;
use super::status::{EngineStatus, StatusCell};
use super::traits::EngineAdapter;
use super::types::{ConversionJob, ConvertedFile, EngineKind, ProgressSink};
use crate::channel::{WorkerEvents, WorkerFailure, WorkerHandler, WorkerMessage, WorkerOutput};
use crate::config::MediaEngineConfig;
use crate::format::FormatDescriptor;

pub const ENGINE_ID: &str = "ffmpeg";

fn unsupported(format: &str) -> WorkerFailure {
    WorkerFailure::new("UnsupportedFormat", format!("Unsupported format: {format}"))
}

/// Worker that runs one ffmpeg conversion per request.
pub struct MediaWorker {
    toolchain: Arc<dyn MediaToolchain>,
    temp_dir: PathBuf,
    options: CommandOptions,
}

impl MediaWorker {
    pub fn new(
        toolchain: Arc<dyn MediaToolchain>,
        temp_dir: impl Into<PathBuf>,
        options: CommandOptions,
    ) -> Self {
        Self {
            toolchain,
            temp_dir: temp_dir.into(),
            options,
        }
    }

    /// Produces a still cover at `cover`, trying each strategy in turn.
    async fn prepare_cover(&self, input: &Path, cover: &Path) -> Result<(), WorkerFailure> {
        let mut last_error = None;
        for (attempt, args) in self.options.cover_attempts(input, cover).iter().enumerate() {
            match self.toolchain.run(args, None, &|_: f32| {}).await {
                Ok(()) if non_empty(cover).await => {
                    debug!(attempt, "Prepared cover image");
                    return Ok(());
                }
                Ok(()) => debug!(attempt, "Cover strategy produced nothing"),
                Err(e) => {
                    debug!(attempt, error = %e, "Cover strategy failed");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => e.into(),
            None => WorkerFailure::new("FfmpegError", "Could not produce a cover image"),
        })
    }
}

async fn non_empty(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

#[async_trait]
impl WorkerHandler for MediaWorker {
    async fn handle(
        &self,
        message: WorkerMessage,
        events: WorkerEvents,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let WorkerMessage::Convert {
            input, to, bitrate, ..
        } = message;
        let from = MediaFormat::from_name(&input.from).ok_or_else(|| unsupported(&input.from))?;
        let target = MediaFormat::from_name(&to).ok_or_else(|| unsupported(&to))?;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("ffmpeg-")
            .tempdir_in(&self.temp_dir)?;
        let input_path = scratch.path().join(format!("input{}", input.from));
        let output_path = scratch.path().join(format!("output{}", to));
        tokio::fs::write(&input_path, &*input.bytes).await?;

        let probe = match self.toolchain.probe(&input_path).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(file = %input.name, error = %e, "Probe failed, continuing without it");
                None
            }
        };
        let kbps = resolve_bitrate(bitrate, from, target, probe.as_ref());
        let duration = probe
            .as_ref()
            .map(|p| p.duration_secs)
            .filter(|d| *d > 0.0);
        let report = |value: f32| events.progress(value);

        match plan_kind(from, target) {
            PlanKind::ExtractAudio => {
                let args =
                    self.options
                        .extract_audio(&input_path, &output_path, target.audio_format(), kbps);
                self.toolchain
                    .run(&args, duration, &report)
                    .await
                    .map_err(|e| {
                        if e.is_missing_stream() {
                            WorkerFailure::new(
                                "NoAudioStream",
                                format!("No audio stream found in {}", input.name),
                            )
                        } else {
                            e.into()
                        }
                    })?;
            }
            PlanKind::AudioToVideo => {
                let MediaFormat::Video(container) = target else {
                    return Err(unsupported(&to));
                };
                let cover = scratch.path().join("cover.png");
                self.prepare_cover(&input_path, &cover).await?;
                let args = self
                    .options
                    .mux_still(&input_path, &cover, &output_path, container, kbps);
                self.toolchain.run(&args, duration, &report).await?;
            }
            PlanKind::Direct => {
                let args = self.options.direct(&input_path, &output_path, target, kbps);
                self.toolchain.run(&args, duration, &report).await?;
            }
        }

        let bytes = tokio::fs::read(&output_path).await.map_err(|_| {
            WorkerFailure::new("FfmpegError", "FFmpeg did not produce an output file")
        })?;
        Ok(WorkerOutput::single(bytes))
    }
}

/// Timed-media adapter backed by [`MediaWorker`].
pub struct MediaAdapter {
    formats: Vec<FormatDescriptor>,
    status: StatusCell,
    toolchain: Arc<dyn MediaToolchain>,
    dispatcher: WorkerDispatcher,
}

impl MediaAdapter {
    /// Creates an adapter that spawns the configured ffmpeg binaries.
    pub fn new(config: &MediaEngineConfig) -> Self {
        Self::with_toolchain(
            config,
            Arc::new(FfmpegToolchain::new(&config.ffmpeg_path, &config.ffprobe_path)),
        )
    }

    pub fn with_toolchain(config: &MediaEngineConfig, toolchain: Arc<dyn MediaToolchain>) -> Self {
        let options = CommandOptions {
            log_level: config.log_level.clone(),
            extra_args: config.extra_args.clone(),
        };
        let worker = MediaWorker::new(Arc::clone(&toolchain), &config.temp_dir, options);
        Self {
            formats: descriptors(),
            status: StatusCell::new(),
            toolchain,
            dispatcher: WorkerDispatcher::new(
                ENGINE_ID,
                Arc::new(worker),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.dispatcher.channel().listener_count()
    }
}

#[async_trait]
impl EngineAdapter for MediaAdapter {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn kind(&self) -> EngineKind {
        EngineKind::TimedMedia
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
        match self.toolchain.validate().await {
            Ok(()) => {
                self.status.mark_ready();
                info!(engine = ENGINE_ID, formats = self.formats.len(), "Engine ready");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(engine = ENGINE_ID, error = %reason, "Engine failed to start");
                self.status.mark_failed(reason.clone());
                Err(EngineError::Unavailable {
                    engine: ENGINE_ID.to_string(),
                    reason,
                })
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

        debug!(engine = ENGINE_ID, file = %job.input.name, to = %job.to, "Converting");
        let output = self.dispatcher.run(&job, progress).await?;
        Ok(ConvertedFile::new(&job.input, &job.to, output.output))
    }

    async fn cancel(&self, file_id: &str) -> Result<(), EngineError> {
        if self.dispatcher.cancel(file_id) {
            debug!(engine = ENGINE_ID, file_id, "Cancelled conversion");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{EngineOptions, SourceFile};
    use crate::testing::MockToolchain;
    use std::sync::Mutex;

    fn config(dir: &Path) -> MediaEngineConfig {
        MediaEngineConfig {
            temp_dir: dir.to_path_buf(),
            ..MediaEngineConfig::default()
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    async fn ready_adapter(dir: &Path, toolchain: Arc<MockToolchain>) -> MediaAdapter {
        let adapter = MediaAdapter::with_toolchain(&config(dir), toolchain);
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_flac_to_mp3_reuses_probed_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(MockToolchain::new().with_probe(MediaInfo {
            duration_secs: 10.0,
            audio_codec: Some("flac".to_string()),
            audio_bitrate_kbps: Some(256),
            ..MediaInfo::default()
        }));
        let adapter = ready_adapter(dir.path(), Arc::clone(&toolchain)).await;

        let job = ConversionJob::new("f1", SourceFile::new("a.flac", vec![1, 2, 3]), "mp3");
        let out = adapter.convert(job, ProgressSink::noop()).await.unwrap();

        assert_eq!(out.name, "a.mp3");
        assert_eq!(&*out.bytes, MockToolchain::OUTPUT);
        let runs = toolchain.runs();
        assert_eq!(runs.len(), 1);
        assert!(has_pair(&runs[0], "-b:a", "256k"));
        assert!(has_pair(&runs[0], "-c:a", "libmp3lame"));
    }

    #[tokio::test]
    async fn test_failed_probe_omits_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(MockToolchain::new());
        let adapter = ready_adapter(dir.path(), Arc::clone(&toolchain)).await;

        let job = ConversionJob::new("f1", SourceFile::new("a.flac", vec![1]), "mp3");
        adapter.convert(job, ProgressSink::noop()).await.unwrap();

        let runs = toolchain.runs();
        assert!(!runs[0].contains(&"-b:a".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_bitrate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(MockToolchain::new().with_probe(MediaInfo {
            audio_bitrate_kbps: Some(256),
            ..MediaInfo::default()
        }));
        let adapter = ready_adapter(dir.path(), Arc::clone(&toolchain)).await;

        let job = ConversionJob::new("f1", SourceFile::new("a.wav", vec![1]), "ogg").with_options(
            EngineOptions {
                bitrate_kbps: Some(96),
                ..EngineOptions::default()
            },
        );
        adapter.convert(job, ProgressSink::noop()).await.unwrap();
        assert!(has_pair(&toolchain.runs()[0], "-b:a", "96k"));
    }

    #[tokio::test]
    async fn test_video_without_audio_reports_no_audio_stream() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(
            MockToolchain::new().fail_when("0:a:0", "Stream map '0:a:0' matches no streams."),
        );
        let adapter = ready_adapter(dir.path(), toolchain).await;

        let job = ConversionJob::new("f1", SourceFile::new("clip.mkv", vec![1]), "mp3");
        let err = adapter.convert(job, ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "NoAudioStream");
        assert!(err.to_string().contains("clip.mkv"));
    }

    #[tokio::test]
    async fn test_audio_to_video_falls_back_to_blank_cover() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(
            MockToolchain::new()
                .fail_when("0:v:0", "Stream map '0:v:0' matches no streams.")
                .fail_when("-vcodec", "Output file does not contain any stream"),
        );
        let adapter = ready_adapter(dir.path(), Arc::clone(&toolchain)).await;

        let job = ConversionJob::new("f1", SourceFile::new("song.mp3", vec![1]), "mp4");
        let out = adapter.convert(job, ProgressSink::noop()).await.unwrap();
        assert_eq!(out.format, ".mp4");

        let runs = toolchain.runs();
        assert_eq!(runs.len(), 4);
        assert!(runs[2].iter().any(|a| a == plan::BLANK_COVER));
        assert!(has_pair(&runs[3], "-tune", "stillimage"));
        assert!(runs[3].iter().any(|a| a.ends_with("cover.png")));
    }

    #[tokio::test]
    async fn test_progress_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(MockToolchain::new().with_progress(vec![25.0, 75.0]));
        let adapter = ready_adapter(dir.path(), toolchain).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            ProgressSink::new(move |p| seen.lock().unwrap().push(p))
        };
        let job = ConversionJob::new("f1", SourceFile::new("a.mp3", vec![1]), "wav");
        adapter.convert(job, sink).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![25.0, 75.0]);
    }

    #[tokio::test]
    async fn test_scratch_directory_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ready_adapter(dir.path(), Arc::new(MockToolchain::new())).await;

        let job = ConversionJob::new("f1", SourceFile::new("a.mp3", vec![1]), "wav");
        adapter.convert(job, ProgressSink::noop()).await.unwrap();

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
        assert_eq!(adapter.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_validation_marks_engine_failed() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = MediaAdapter::with_toolchain(
            &config(dir.path()),
            Arc::new(MockToolchain::new().with_validation_failure()),
        );
        assert!(adapter.initialize().await.is_err());
        assert!(matches!(adapter.status(), EngineStatus::Failed { .. }));

        let job = ConversionJob::new("f1", SourceFile::new("a.mp3", vec![1]), "wav");
        let err = adapter.convert(job, ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "EngineUnavailable");
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ready_adapter(dir.path(), Arc::new(MockToolchain::new())).await;
        let job = ConversionJob::new("f1", SourceFile::new("a.mp3", vec![1]), "png");
        let err = adapter.convert(job, ProgressSink::noop()).await.unwrap_err();
        assert_eq!(err.error_kind(), "UnsupportedFormat");
    }
}
