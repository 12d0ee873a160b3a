//! Mock ffmpeg toolchain for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::engine::media::{MediaInfo, MediaToolchain, ProgressFn, ToolchainError};

/// Mock implementation of the [`MediaToolchain`] trait.
///
/// Records every ffmpeg invocation and writes [`MockToolchain::OUTPUT`] to the
/// output path (the last argument) on success.
///
/// # Example
///
/// ```rust,ignore
/// let toolchain = MockToolchain::new()
///     .with_probe(MediaInfo { audio_bitrate_kbps: Some(256), ..Default::default() })
///     .fail_when("0:a:0", "Stream map '0:a:0' matches no streams.");
/// ```
#[derive(Debug, Default)]
pub struct MockToolchain {
    probe: Option<MediaInfo>,
    failures: Vec<(String, String)>,
    progress: Vec<f32>,
    validation_fails: bool,
    runs: Mutex<Vec<Vec<String>>>,
}

impl MockToolchain {
    /// Bytes written as the output of every successful run.
    pub const OUTPUT: &'static [u8] = b"mock-ffmpeg-output";

    /// A toolchain whose probe fails and whose runs all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `probe` return `info`.
    pub fn with_probe(mut self, info: MediaInfo) -> Self {
        self.probe = Some(info);
        self
    }

    /// Fails any run with an argument containing `pattern`, reporting `stderr`.
    pub fn fail_when(mut self, pattern: &str, stderr: &str) -> Self {
        self.failures.push((pattern.to_string(), stderr.to_string()));
        self
    }

    /// Progress values emitted by every successful run.
    pub fn with_progress(mut self, values: Vec<f32>) -> Self {
        self.progress = values;
        self
    }

    /// Makes `validate` report a missing ffmpeg binary.
    pub fn with_validation_failure(mut self) -> Self {
        self.validation_fails = true;
        self
    }

    /// Arguments of every run so far.
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl MediaToolchain for MockToolchain {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolchainError> {
        self.probe.clone().ok_or_else(|| {
            ToolchainError::probe_failed(format!("no probe configured for {}", path.display()))
        })
    }

    async fn run(
        &self,
        args: &[String],
        _duration_secs: Option<f64>,
        progress: ProgressFn<'_>,
    ) -> Result<(), ToolchainError> {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(args.to_vec());

        for (pattern, stderr) in &self.failures {
            if args.iter().any(|arg| arg.contains(pattern.as_str())) {
                return Err(ToolchainError::failed(
                    "FFmpeg exited with code: Some(1)",
                    Some(stderr.clone()),
                ));
            }
        }

        for value in &self.progress {
            progress(*value);
        }

        if let Some(output) = args.last() {
            tokio::fs::write(output, Self::OUTPUT).await?;
        }
        Ok(())
    }

    async fn validate(&self) -> Result<(), ToolchainError> {
        if self.validation_fails {
            return Err(ToolchainError::FfmpegNotFound {
                path: PathBuf::from("ffmpeg"),
            });
        }
        Ok(())
    }
}
