//! Builds ffmpeg argument lists for each conversion shape.

use std::path::Path;

use super::formats::{AudioFormat, ContainerFormat, MediaFormat};
use super::toolchain::MediaInfo;

/// Bitrate used when an uncompressed source is encoded lossy.
pub const UNCOMPRESSED_SOURCE_KBPS: u32 = 320;

/// Size of the generated cover when the source carries no artwork.
pub const BLANK_COVER: &str = "color=c=black:s=1280x720:r=1";

/// How a source/target pair is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// One ffmpeg pass with the target's codecs.
    Direct,
    /// Video container to audio-only: first audio stream is kept.
    ExtractAudio,
    /// Audio-only to video container: a still cover is looped over the
    /// audio track.
    AudioToVideo,
}

pub fn plan_kind(from: MediaFormat, to: MediaFormat) -> PlanKind {
    match (from, to) {
        (MediaFormat::Video(_), MediaFormat::Audio(_)) => PlanKind::ExtractAudio,
        (MediaFormat::Audio(_), MediaFormat::Video(_)) => PlanKind::AudioToVideo,
        _ => PlanKind::Direct,
    }
}

/// Picks the `-b:a` value for a conversion.
///
/// An explicit value wins. Otherwise uncompressed sources get
/// [`UNCOMPRESSED_SOURCE_KBPS`] and everything else reuses the probed
/// source bitrate. Targets whose encoder takes no bitrate get `None`.
pub fn resolve_bitrate(
    explicit: Option<u32>,
    from: MediaFormat,
    to: MediaFormat,
    probe: Option<&MediaInfo>,
) -> Option<u32> {
    if !to.audio_format().accepts_bitrate() {
        return None;
    }
    if let Some(kbps) = explicit.filter(|k| *k > 0) {
        return Some(kbps);
    }
    if matches!(from, MediaFormat::Audio(audio) if audio.is_uncompressed()) {
        return Some(UNCOMPRESSED_SOURCE_KBPS);
    }
    probe.and_then(MediaInfo::source_bitrate_kbps)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn push_all(args: &mut Vec<String>, values: &[&str]) {
    args.extend(values.iter().map(|v| v.to_string()));
}

/// Shared flags appended to every ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub log_level: String,
    pub extra_args: Vec<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            log_level: "error".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl CommandOptions {
    fn start(&self) -> Vec<String> {
        vec!["-y".to_string()]
    }

    fn finish(&self, mut args: Vec<String>, output: &Path) -> Vec<String> {
        args.extend([
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);
        args.extend(self.extra_args.iter().cloned());
        args.push(path_arg(output));
        args
    }

    /// Single-pass conversion into `to`.
    pub fn direct(
        &self,
        input: &Path,
        output: &Path,
        to: MediaFormat,
        bitrate: Option<u32>,
    ) -> Vec<String> {
        let mut args = self.start();
        args.extend(["-i".to_string(), path_arg(input)]);
        match to {
            MediaFormat::Audio(audio) => {
                // Attached cover art is a video stream.
                args.push("-vn".to_string());
                audio_codec_args(&mut args, audio, bitrate);
            }
            MediaFormat::Video(container) => {
                video_codec_args(&mut args, container, false);
                audio_codec_args(&mut args, container.audio_format(), bitrate);
                push_all(&mut args, container.extra_args());
            }
        }
        self.finish(args, output)
    }

    /// Keeps only the first audio stream of a video source.
    pub fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        to: AudioFormat,
        bitrate: Option<u32>,
    ) -> Vec<String> {
        let mut args = self.start();
        args.extend(["-i".to_string(), path_arg(input)]);
        push_all(&mut args, &["-map", "0:a:0"]);
        audio_codec_args(&mut args, to, bitrate);
        self.finish(args, output)
    }

    /// Candidate commands producing a still cover image, in preference
    /// order: decoded artwork, copied artwork, then a blank frame.
    pub fn cover_attempts(&self, input: &Path, cover: &Path) -> Vec<Vec<String>> {
        let decoded = {
            let mut args = self.start();
            args.extend(["-i".to_string(), path_arg(input)]);
            push_all(&mut args, &["-map", "0:v:0", "-frames:v", "1"]);
            self.finish(args, cover)
        };
        let copied = {
            let mut args = self.start();
            args.extend(["-i".to_string(), path_arg(input)]);
            push_all(&mut args, &["-an", "-vcodec", "copy", "-frames:v", "1"]);
            self.finish(args, cover)
        };
        let blank = {
            let mut args = self.start();
            push_all(&mut args, &["-f", "lavfi", "-i", BLANK_COVER, "-frames:v", "1"]);
            self.finish(args, cover)
        };
        vec![decoded, copied, blank]
    }

    /// Loops `cover` for the length of the audio in `input`.
    pub fn mux_still(
        &self,
        input: &Path,
        cover: &Path,
        output: &Path,
        container: ContainerFormat,
        bitrate: Option<u32>,
    ) -> Vec<String> {
        let mut args = self.start();
        args.extend(["-i".to_string(), path_arg(input)]);
        push_all(&mut args, &["-loop", "1", "-framerate", "1"]);
        args.extend(["-i".to_string(), path_arg(cover)]);
        push_all(&mut args, &["-map", "0:a:0", "-map", "1:v:0"]);
        video_codec_args(&mut args, container, true);
        audio_codec_args(&mut args, container.audio_format(), bitrate);
        push_all(
            &mut args,
            &[
                "-vf",
                "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                "-pix_fmt",
                "yuv420p",
                "-shortest",
            ],
        );
        push_all(&mut args, container.extra_args());
        self.finish(args, output)
    }
}

fn video_codec_args(args: &mut Vec<String>, container: ContainerFormat, still: bool) {
    let codec = container.video_codec();
    push_all(args, &["-c:v", codec]);
    if codec == "libx264" {
        push_all(args, &["-preset", "ultrafast", "-crf", "18"]);
        if still {
            push_all(args, &["-tune", "stillimage"]);
        }
    }
}

fn audio_codec_args(args: &mut Vec<String>, audio: AudioFormat, bitrate: Option<u32>) {
    push_all(args, &["-c:a", audio.ffmpeg_codec()]);
    if let Some(kbps) = bitrate.filter(|_| audio.accepts_bitrate()) {
        args.extend(["-b:a".to_string(), format!("{}k", kbps)]);
    }
    push_all(args, audio.extra_args());
}
