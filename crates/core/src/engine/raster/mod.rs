//! Raster image engine.
//!
//! Decodes and encodes in-process with the `image` crate and rasterizes SVG
//! with `resvg`. Every request runs on its own blocking task behind the
//! execution channel.

mod encode;
mod formats;
mod frames;
mod metadata;
mod svg;

pub use formats::{codec_for, descriptors, RasterCodec};
pub use metadata::ImageMetadata;
pub use svg::FALLBACK_SIZE as SVG_FALLBACK_SIZE;

use async_trait::async_trait;
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frame, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::archive::{frame_entry_name, zip_entries};
use super::dispatch::WorkerDispatcher;
use super::error::EngineError;
use super::status::{EngineStatus, StatusCell};
use super::traits::EngineAdapter;
use super::types::{ConversionJob, ConvertedFile, EngineKind, ProgressSink};
use crate::channel::{WorkerEvents, WorkerFailure, WorkerHandler, WorkerMessage, WorkerOutput};
use crate::config::ImageEngineConfig;
use crate::format::FormatDescriptor;

pub const ENGINE_ID: &str = "image";

/// Worker that performs one raster conversion per request.
pub struct RasterWorker {
    default_quality: u8,
}

impl RasterWorker {
    pub fn new(default_quality: u8) -> Self {
        Self { default_quality }
    }
}

#[async_trait]
impl WorkerHandler for RasterWorker {
    async fn handle(
        &self,
        message: WorkerMessage,
        _events: WorkerEvents,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let WorkerMessage::Convert {
            input,
            to,
            compression,
            ..
        } = message;
        let quality = compression.unwrap_or(self.default_quality).min(100);

        tokio::task::spawn_blocking(move || convert_raster(&input.bytes, &input.from, &to, quality))
            .await
            .map_err(|e| WorkerFailure::new("WorkerPanicked", e.to_string()))?
    }
}

fn unsupported(format: &str) -> WorkerFailure {
    WorkerFailure::new("UnsupportedFormat", format!("Unsupported format: {format}"))
}

/// Converts `bytes` from `from` to `to`.
///
/// SVG input is rasterized to an intermediate PNG first; the PNG then takes
/// the regular path. There is no further indirection.
pub fn convert_raster(
    bytes: &[u8],
    from: &str,
    to: &str,
    quality: u8,
) -> Result<WorkerOutput, WorkerFailure> {
    let from_codec = codec_for(from).ok_or_else(|| unsupported(from))?;
    let to_codec = codec_for(to).ok_or_else(|| unsupported(to))?;

    match from_codec {
        RasterCodec::Svg => {
            let (png, width, height) = svg::rasterize(bytes)?;
            debug!(width, height, "Rasterized SVG");
            convert_bitmap(&png, ".png", RasterCodec::Image(ImageFormat::Png), to, to_codec, quality)
        }
        codec => convert_bitmap(bytes, from, codec, to, to_codec, quality),
    }
}

fn convert_bitmap(
    bytes: &[u8],
    from: &str,
    from_codec: RasterCodec,
    to: &str,
    to_codec: RasterCodec,
    quality: u8,
) -> Result<WorkerOutput, WorkerFailure> {
    if from_codec.is_multi_frame() {
        let frames = frames::decode_frames(from, bytes)?;
        let mut entries = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let encoded = encode::encode(frame, to_codec, quality, &ImageMetadata::default())?;
            entries.push((frame_entry_name(index, to), encoded));
        }
        debug!(frames = entries.len(), "Packed frames into archive");
        return Ok(WorkerOutput::archive(zip_entries(entries)?));
    }

    if to_codec == RasterCodec::Image(ImageFormat::Gif) {
        if let Some(frames) = animation_frames(from_codec, bytes) {
            return Ok(WorkerOutput::single(encode::encode_animated_gif(frames)?));
        }
    }

    let format = formats::decode_format(from_codec).ok_or_else(|| unsupported(from))?;
    let bytes: Cow<'_, [u8]> = match from_codec {
        RasterCodec::Cursor => Cow::Owned(frames::cursor_as_icon(bytes)?),
        _ => Cow::Borrowed(bytes),
    };
    let (image, metadata) = metadata::decode_with_metadata(&bytes, format)?;
    if !metadata.is_empty() {
        debug!(
            icc = metadata.has_icc_profile(),
            exif = metadata.exif.is_some(),
            "Carrying source metadata"
        );
    }
    Ok(WorkerOutput::single(encode::encode(
        &image, to_codec, quality, &metadata,
    )?))
}

/// Frames of an animated GIF or WebP; `None` for still images.
fn animation_frames(codec: RasterCodec, bytes: &[u8]) -> Option<Vec<Frame>> {
    let frames = match codec {
        RasterCodec::Image(ImageFormat::Gif) => GifDecoder::new(Cursor::new(bytes))
            .ok()?
            .into_frames()
            .collect_frames()
            .ok()?,
        RasterCodec::Image(ImageFormat::WebP) => {
            let decoder = WebPDecoder::new(Cursor::new(bytes)).ok()?;
            if !decoder.has_animation() {
                return None;
            }
            decoder.into_frames().collect_frames().ok()?
        }
        _ => return None,
    };
    (frames.len() > 1).then_some(frames)
}

/// Raster adapter backed by [`RasterWorker`].
pub struct RasterAdapter {
    formats: Vec<FormatDescriptor>,
    status: StatusCell,
    dispatcher: WorkerDispatcher,
}

impl RasterAdapter {
    pub fn new(config: &ImageEngineConfig, default_quality: u8) -> Self {
        Self {
            formats: descriptors(),
            status: StatusCell::new(),
            dispatcher: WorkerDispatcher::new(
                ENGINE_ID,
                Arc::new(RasterWorker::new(default_quality)),
                Duration::from_secs(config.timeout_secs),
            ),
        }
    }

    /// Number of requests waiting on the worker channel.
    pub fn listener_count(&self) -> usize {
        self.dispatcher.channel().listener_count()
    }
}

#[async_trait]
impl EngineAdapter for RasterAdapter {
    fn id(&self) -> &str {
        ENGINE_ID
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Raster
    }

    fn supported_formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    fn reports_progress(&self) -> bool {
        false
    }

    fn status(&self) -> EngineStatus {
        self.status.get()
    }

    async fn initialize(&self) -> Result<(), EngineError> {
        // Codecs are compiled in.
        self.status.mark_ready();
        info!(engine = ENGINE_ID, formats = self.formats.len(), "Engine ready");
        Ok(())
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
        let format = if output.zip { ".zip" } else { job.to.as_str() };
        Ok(ConvertedFile::new(&job.input, format, output.output))
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
    use crate::testing::fixtures::{ico_with_sizes, png_bytes};
    use super::*;
    use crate::engine::types::SourceFile;
    use image::GenericImageView;
    use std::io::Read;
    use zip::ZipArchive;

    fn adapter() -> RasterAdapter {
        RasterAdapter::new(&ImageEngineConfig::default(), 90)
    }

    #[tokio::test]
    async fn test_png_to_jpeg() {
        let adapter = adapter();
        adapter.initialize().await.unwrap();
        assert!(adapter.is_ready());

        let input = SourceFile::new("photo.png", png_bytes(30, 20, [255, 0, 0, 255]));
        let job = ConversionJob::new("f1", input, "jpg");
        let out = adapter.convert(job, ProgressSink::noop()).await.unwrap();

        assert_eq!(out.name, "photo.jpg");
        assert_eq!(out.format, ".jpg");
        let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (30, 20));
        assert_eq!(adapter.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_ico_explodes_into_archive() {
        let adapter = adapter();
        let input = SourceFile::new("icon.ico", ico_with_sizes(&[16, 32, 48], 1));
        let out = adapter
            .convert(ConversionJob::new("f1", input, "png"), ProgressSink::noop())
            .await
            .unwrap();

        assert_eq!(out.format, ".zip");
        assert_eq!(out.name, "icon.zip");

        let mut archive = ZipArchive::new(Cursor::new(out.bytes.to_vec())).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["image0.png", "image1.png", "image2.png"]);

        let mut second = Vec::new();
        archive
            .by_name("image1.png")
            .unwrap()
            .read_to_end(&mut second)
            .unwrap();
        assert_eq!(image::load_from_memory(&second).unwrap().dimensions(), (32, 32));
    }

    #[tokio::test]
    async fn test_single_cursor_converts_to_one_image() {
        let adapter = adapter();
        let input = SourceFile::new("arrow.cur", ico_with_sizes(&[32], 2));
        let out = adapter
            .convert(ConversionJob::new("f1", input, "png"), ProgressSink::noop())
            .await
            .unwrap();

        assert_eq!(out.format, ".png");
        assert_eq!(out.name, "arrow.png");
        let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (32, 32));
    }

    #[tokio::test]
    async fn test_svg_is_rasterized_then_converted() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="12"><rect width="24" height="12" fill="green"/></svg>"#;
        let adapter = adapter();
        let out = adapter
            .convert(
                ConversionJob::new("f1", SourceFile::new("logo.svg", svg.to_vec()), "webp"),
                ProgressSink::noop(),
            )
            .await
            .unwrap();

        assert_eq!(out.format, ".webp");
        let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.dimensions(), (24, 12));
    }

    #[tokio::test]
    async fn test_unwritable_target_is_rejected() {
        let adapter = adapter();
        let input = SourceFile::new("a.png", png_bytes(2, 2, [0, 0, 0, 255]));
        let err = adapter
            .convert(ConversionJob::new("f1", input, "svg"), ProgressSink::noop())
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), "UnsupportedFormat");
    }

    #[tokio::test]
    async fn test_corrupt_input_fails_with_decode_error() {
        let adapter = adapter();
        let input = SourceFile::new("broken.png", vec![1, 2, 3, 4]);
        let err = adapter
            .convert(ConversionJob::new("f1", input, "bmp"), ProgressSink::noop())
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), "DecodeError");
    }

    #[test]
    fn test_animated_gif_keeps_frames() {
        use image::{Delay, RgbaImage};

        let frames: Vec<Frame> = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]]
            .into_iter()
            .map(|c| {
                Frame::from_parts(
                    RgbaImage::from_pixel(8, 8, image::Rgba(c)),
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                )
            })
            .collect();
        let gif = encode::encode_animated_gif(frames).unwrap();

        let output = convert_raster(&gif, ".gif", ".gif", 90).unwrap();
        let decoded = GifDecoder::new(Cursor::new(&*output.output))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(decoded.len(), 3);
    }
}
