//! Timed-media formats and their ffmpeg codec pairing.

use crate::format::FormatDescriptor;

/// Audio-only output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG Audio Layer III
    Mp3,
    /// WAVE (uncompressed)
    Wav,
    /// Free Lossless Audio Codec (lossless)
    Flac,
    /// Ogg Vorbis
    Ogg,
    /// Opus (modern, efficient)
    Opus,
    /// Raw AAC in an ADTS stream
    Aac,
    /// AAC in an MPEG-4 audio container
    M4a,
    /// Windows Media Audio
    Wma,
    /// Adaptive Multi-Rate narrowband
    Amr,
    /// Dolby Digital
    Ac3,
    /// Apple Lossless
    Alac,
    /// AIFF (uncompressed)
    Aiff,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 12] = [
        Self::Mp3,
        Self::Wav,
        Self::Flac,
        Self::Ogg,
        Self::Opus,
        Self::Aac,
        Self::M4a,
        Self::Wma,
        Self::Amr,
        Self::Ac3,
        Self::Alac,
        Self::Aiff,
    ];

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::M4a => "m4a",
            Self::Wma => "wma",
            Self::Amr => "amr",
            Self::Ac3 => "ac3",
            Self::Alac => "alac",
            Self::Aiff => "aiff",
        }
    }

    /// Returns the ffmpeg codec name for this format.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Wav => "pcm_s16le",
            Self::Flac => "flac",
            Self::Ogg => "libvorbis",
            Self::Opus => "libopus",
            Self::Aac | Self::M4a => "aac",
            Self::Wma => "wmav2",
            Self::Amr => "libopencore_amrnb",
            Self::Ac3 => "ac3",
            Self::Alac => "alac",
            Self::Aiff => "pcm_s16be",
        }
    }

    /// Container flags required by this format.
    pub fn extra_args(&self) -> &'static [&'static str] {
        match self {
            Self::Aac => &["-f", "adts"],
            Self::Amr => &["-ar", "8000", "-ac", "1"],
            Self::Alac => &["-f", "ipod"],
            _ => &[],
        }
    }

    /// Whether this format is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Wav | Self::Alac | Self::Aiff)
    }

    /// Whether this format stores raw PCM samples.
    pub fn is_uncompressed(&self) -> bool {
        matches!(self, Self::Wav | Self::Aiff)
    }

    /// Whether the encoder takes a `-b:a` target. AMR only has fixed modes.
    pub fn accepts_bitrate(&self) -> bool {
        !self.is_lossless() && *self != Self::Amr
    }
}

/// Video container output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mkv,
    Mp4,
    Avi,
    Mov,
    Webm,
    Ts,
    Mts,
    M2ts,
    Wmv,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 9] = [
        Self::Mkv,
        Self::Mp4,
        Self::Avi,
        Self::Mov,
        Self::Webm,
        Self::Ts,
        Self::Mts,
        Self::M2ts,
        Self::Wmv,
    ];

    /// Returns the file extension for this container.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Webm => "webm",
            Self::Ts => "ts",
            Self::Mts => "mts",
            Self::M2ts => "m2ts",
            Self::Wmv => "wmv",
        }
    }

    /// Returns the ffmpeg video codec for this container.
    pub fn video_codec(&self) -> &'static str {
        match self {
            Self::Webm => "libvpx-vp9",
            Self::Wmv => "wmv2",
            _ => "libx264",
        }
    }

    /// Audio track format muxed into this container.
    pub fn audio_format(&self) -> AudioFormat {
        match self {
            Self::Avi => AudioFormat::Mp3,
            Self::Webm => AudioFormat::Opus,
            Self::Wmv => AudioFormat::Wma,
            _ => AudioFormat::M4a,
        }
    }

    /// Container flags.
    pub fn extra_args(&self) -> &'static [&'static str] {
        match self {
            Self::Mp4 | Self::Mov => &["-movflags", "+faststart"],
            Self::Ts | Self::Mts | Self::M2ts => &["-f", "mpegts"],
            Self::Wmv => &["-ar", "44100"],
            _ => &[],
        }
    }
}

/// A timed-media format, classified as audio-only or video container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Audio(AudioFormat),
    Video(ContainerFormat),
}

impl MediaFormat {
    /// Looks up a normalized (`.ext`) or bare format name.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.trim_start_matches('.');
        if let Some(audio) = AudioFormat::ALL.iter().find(|f| f.extension() == ext) {
            return Some(Self::Audio(*audio));
        }
        ContainerFormat::ALL
            .iter()
            .find(|f| f.extension() == ext)
            .map(|c| Self::Video(*c))
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    /// The audio format written for this target.
    pub fn audio_format(&self) -> AudioFormat {
        match self {
            Self::Audio(audio) => *audio,
            Self::Video(container) => container.audio_format(),
        }
    }
}

/// Descriptors: audio formats native, video containers through a
/// fallback path.
pub fn descriptors() -> Vec<FormatDescriptor> {
    let audio = AudioFormat::ALL
        .iter()
        .map(|f| FormatDescriptor::new(f.extension(), true, true));
    let video = ContainerFormat::ALL
        .iter()
        .map(|c| FormatDescriptor::non_native(c.extension(), true, true));
    audio.chain(video).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            MediaFormat::from_name(".flac"),
            Some(MediaFormat::Audio(AudioFormat::Flac))
        );
        assert_eq!(
            MediaFormat::from_name("mkv"),
            Some(MediaFormat::Video(ContainerFormat::Mkv))
        );
        assert!(MediaFormat::from_name(".png").is_none());
    }

    #[test]
    fn test_descriptor_nativeness() {
        let descriptors = descriptors();
        assert_eq!(descriptors.len(), 21);
        let mp3 = descriptors.iter().find(|d| d.name == ".mp3").unwrap();
        let mkv = descriptors.iter().find(|d| d.name == ".mkv").unwrap();
        assert!(mp3.is_native);
        assert!(!mkv.is_native);
    }

    #[test]
    fn test_bitrate_applicability() {
        assert!(AudioFormat::Mp3.accepts_bitrate());
        assert!(AudioFormat::M4a.accepts_bitrate());
        assert!(!AudioFormat::Flac.accepts_bitrate());
        assert!(!AudioFormat::Amr.accepts_bitrate());
        assert!(AudioFormat::Wav.is_uncompressed());
        assert!(!AudioFormat::Flac.is_uncompressed());
    }

    #[test]
    fn test_container_pairing() {
        assert_eq!(ContainerFormat::Webm.video_codec(), "libvpx-vp9");
        assert_eq!(ContainerFormat::Webm.audio_format(), AudioFormat::Opus);
        assert_eq!(ContainerFormat::Avi.audio_format().ffmpeg_codec(), "libmp3lame");
        assert_eq!(ContainerFormat::Mts.extra_args(), &["-f", "mpegts"]);
    }
}
