//! Process-level access to ffmpeg and ffprobe.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::error::ToolchainError;

/// Callback receiving a 0-100 percentage.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// Stream and container facts reported by ffprobe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    /// First container name, e.g. "matroska" for "matroska,webm".
    pub format: String,
    pub audio_codec: Option<String>,
    pub audio_bitrate_kbps: Option<u32>,
    /// Overall container bitrate.
    pub format_bitrate_kbps: Option<u32>,
    pub video_codec: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
}

impl MediaInfo {
    /// Stream bitrate of the first audio track, else the container bitrate.
    pub fn source_bitrate_kbps(&self) -> Option<u32> {
        self.audio_bitrate_kbps
            .or(self.format_bitrate_kbps)
            .filter(|kbps| *kbps > 0)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// The ffmpeg operations the media engine needs.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Reads stream information from `path`.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolchainError>;

    /// Runs ffmpeg with `args`, reporting progress against `duration_secs`
    /// when known.
    async fn run(
        &self,
        args: &[String],
        duration_secs: Option<f64>,
        progress: ProgressFn<'_>,
    ) -> Result<(), ToolchainError>;

    /// Checks that the binaries can be launched.
    async fn validate(&self) -> Result<(), ToolchainError>;
}

/// Spawns the real ffmpeg/ffprobe binaries.
pub struct FfmpegToolchain {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn not_found(&self, binary: &Path, err: std::io::Error) -> ToolchainError {
        if err.kind() != std::io::ErrorKind::NotFound {
            return ToolchainError::Io(err);
        }
        if binary == self.ffprobe_path {
            ToolchainError::FfprobeNotFound {
                path: binary.to_path_buf(),
            }
        } else {
            ToolchainError::FfmpegNotFound {
                path: binary.to_path_buf(),
            }
        }
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolchainError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.not_found(&self.ffprobe_path, e))?;

        if !output.status.success() {
            return Err(ToolchainError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn run(
        &self,
        args: &[String],
        duration_secs: Option<f64>,
        progress: ProgressFn<'_>,
    ) -> Result<(), ToolchainError> {
        // Dropping the future (timeout or cancel upstream) kills the child.
        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.not_found(&self.ffmpeg_path, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolchainError::failed("stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let progress_interval = Duration::from_millis(500);
        let mut last_progress_send = Instant::now();
        let mut error_output = String::new();

        while let Some(line) = reader.next_line().await? {
            if line.contains("Error") || line.contains("error") || line.contains("matches no streams")
            {
                error_output.push_str(&line);
                error_output.push('\n');
            }

            let current_time = time_regex
                .as_ref()
                .and_then(|re| re.captures(&line))
                .and_then(|caps| caps.get(1))
                .and_then(|ms| ms.as_str().parse::<f64>().ok())
                .map(|us| us / 1_000_000.0);

            if let (Some(time), Some(duration)) = (current_time, duration_secs) {
                if duration > 0.0 && last_progress_send.elapsed() >= progress_interval {
                    progress((time / duration * 100.0).min(100.0) as f32);
                    last_progress_send = Instant::now();
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ToolchainError::failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                (!error_output.is_empty()).then_some(error_output),
            ));
        }
        Ok(())
    }

    async fn validate(&self) -> Result<(), ToolchainError> {
        for binary in [&self.ffmpeg_path, &self.ffprobe_path] {
            let output = Command::new(binary)
                .arg("-version")
                .output()
                .await
                .map_err(|e| self.not_found(binary, e))?;
            if !output.status.success() {
                return Err(ToolchainError::failed(
                    format!("{} -version exited with {:?}", binary.display(), output.status.code()),
                    None,
                ));
            }
        }
        Ok(())
    }
}

/// Parses `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(output: &str) -> Result<MediaInfo, ToolchainError> {
    #[derive(Deserialize)]
    struct ProbeOutput {
        format: ProbeFormat,
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    #[derive(Deserialize)]
    struct ProbeFormat {
        format_name: String,
        duration: Option<String>,
        bit_rate: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: String,
        codec_name: Option<String>,
        bit_rate: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }

    fn kbps(value: Option<&String>) -> Option<u32> {
        value
            .and_then(|b| b.parse::<u64>().ok())
            .map(|b| (b / 1000) as u32)
    }

    let probe: ProbeOutput =
        serde_json::from_str(output).map_err(|e| ToolchainError::ParseError {
            reason: format!("Failed to parse ffprobe output: {}", e),
        })?;

    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

    Ok(MediaInfo {
        duration_secs: probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0),
        format: probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string(),
        audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        audio_bitrate_kbps: kbps(audio_stream.and_then(|s| s.bit_rate.as_ref())),
        format_bitrate_kbps: kbps(probe.format.bit_rate.as_ref()),
        video_codec: video_stream.and_then(|s| s.codec_name.clone()),
        video_width: video_stream.and_then(|s| s.width),
        video_height: video_stream.and_then(|s| s.height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_audio() {
        let json = r#"{
            "format": {
                "filename": "test.flac",
                "format_name": "flac",
                "duration": "180.5",
                "bit_rate": "900000"
            },
            "streams": [
                {
                    "codec_type": "audio",
                    "codec_name": "flac",
                    "bit_rate": "256000",
                    "sample_rate": "44100",
                    "channels": 2
                }
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.format, "flac");
        assert!((info.duration_secs - 180.5).abs() < 0.01);
        assert_eq!(info.audio_bitrate_kbps, Some(256));
        assert_eq!(info.source_bitrate_kbps(), Some(256));
        assert!(info.has_audio());
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_container_bitrate() {
        let json = r#"{
            "format": {
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "bit_rate": "5000000"
            },
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"codec_type": "audio", "codec_name": "opus"}
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.format, "matroska");
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.video_width, Some(1920));
        assert_eq!(info.audio_bitrate_kbps, None);
        assert_eq!(info.source_bitrate_kbps(), Some(5000));
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        let err = parse_probe_output("not json").unwrap_err();
        assert!(matches!(err, ToolchainError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let toolchain = FfmpegToolchain::new(
            "/nonexistent/convertino-ffmpeg",
            "/nonexistent/convertino-ffprobe",
        );
        let err = toolchain.validate().await.unwrap_err();
        assert!(matches!(err, ToolchainError::FfmpegNotFound { .. }));

        let err = toolchain.probe(Path::new("/tmp/x.mp3")).await.unwrap_err();
        assert!(matches!(err, ToolchainError::FfprobeNotFound { .. }));
    }
}
