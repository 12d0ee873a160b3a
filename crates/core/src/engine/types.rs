//! Types shared by all engine adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::format::{normalize_format, Category};

/// Derives the source format from a file name: the text after the last `.`,
/// lowercased, with the leading `.`.
pub fn format_from_name(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or_default();
    normalize_format(ext)
}

/// The bytes of a file together with its name and inferred format.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub format: String,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    /// Creates a source file, lowercasing the extension of `name`.
    pub fn new(name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{}.{}", stem, ext.to_lowercase()),
            None => name.to_string(),
        };
        let format = format_from_name(&name);
        Self {
            name,
            format,
            bytes: bytes.into(),
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => &self.name,
        }
    }

    /// Original extension without the leading `.`.
    pub fn extension(&self) -> &str {
        self.format.trim_start_matches('.')
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// The output of a successful conversion.
#[derive(Clone, Serialize)]
pub struct ConvertedFile {
    pub name: String,
    /// Actual output format; `.zip` when the engine emitted an archive.
    pub format: String,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    pub size_bytes: usize,
}

impl ConvertedFile {
    /// Wraps engine output for `source`, naming it after the source stem.
    pub fn new(source: &SourceFile, format: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        let format = normalize_format(format);
        let bytes = bytes.into();
        Self {
            name: format!("{}{}", source.stem(), format),
            size_bytes: bytes.len(),
            format,
            bytes,
        }
    }

    pub fn is_archive(&self) -> bool {
        self.format == ".zip"
    }
}

impl fmt::Debug for ConvertedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedFile")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Per-conversion options supplied by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Compression quality 0-100 for raster encoders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Explicit audio bitrate in kbps for timed media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

/// A unit of work handed to an adapter.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Owning file entity; used to route `cancel`.
    pub file_id: String,
    pub input: SourceFile,
    /// Normalized target format.
    pub to: String,
    pub options: EngineOptions,
}

impl ConversionJob {
    pub fn new(file_id: impl Into<String>, input: SourceFile, to: &str) -> Self {
        Self {
            file_id: file_id.into(),
            input,
            to: normalize_format(to),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }
}

/// Receives progress percentages (0-100) from an engine.
#[derive(Clone, Default)]
pub struct ProgressSink {
    report: Option<Arc<dyn Fn(f32) + Send + Sync>>,
}

impl ProgressSink {
    pub fn new(report: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            report: Some(Arc::new(report)),
        }
    }

    /// A sink that drops every update.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Reports a percentage, clamped to 0-100. Non-finite values are ignored.
    pub fn report(&self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        if let Some(report) = &self.report {
            report(percent.clamp(0.0, 100.0));
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("attached", &self.report.is_some())
            .finish()
    }
}

/// Closed set of engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Raster,
    TimedMedia,
    Document,
    RemoteJob,
}

impl EngineKind {
    /// The UI category this engine family feeds.
    pub fn category(&self) -> Category {
        match self {
            Self::Raster => Category::Image,
            Self::TimedMedia => Category::Audio,
            Self::RemoteJob => Category::Video,
            Self::Document => Category::Document,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::TimedMedia => "timed_media",
            Self::Document => "document",
            Self::RemoteJob => "remote_job",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_format_from_name() {
        assert_eq!(format_from_name("a.FLAC"), ".flac");
        assert_eq!(format_from_name("archive.tar.gz"), ".gz");
        assert_eq!(format_from_name("README"), ".readme");
    }

    #[test]
    fn test_source_file_lowercases_extension() {
        let file = SourceFile::new("Holiday.JPG", vec![1, 2, 3]);
        assert_eq!(file.name, "Holiday.jpg");
        assert_eq!(file.format, ".jpg");
        assert_eq!(file.stem(), "Holiday");
        assert_eq!(file.extension(), "jpg");
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn test_converted_file_naming() {
        let source = SourceFile::new("icon.ico", vec![0u8; 4]);
        let out = ConvertedFile::new(&source, "zip", vec![9u8; 10]);
        assert_eq!(out.name, "icon.zip");
        assert!(out.is_archive());
        assert_eq!(out.size_bytes, 10);
    }

    #[test]
    fn test_progress_sink_clamps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = ProgressSink::new(move |p| seen_clone.lock().unwrap().push(p));

        sink.report(-5.0);
        sink.report(42.0);
        sink.report(250.0);
        sink.report(f32::NAN);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 42.0, 100.0]);
        ProgressSink::noop().report(10.0);
    }

    #[test]
    fn test_engine_kind_category() {
        assert_eq!(EngineKind::Raster.category(), Category::Image);
        assert_eq!(EngineKind::TimedMedia.category(), Category::Audio);
        assert_eq!(EngineKind::RemoteJob.category(), Category::Video);
        assert_eq!(EngineKind::Document.category(), Category::Document);
    }
}
