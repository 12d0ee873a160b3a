//! Encoding decoded images into the target raster format.

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::ico::IcoEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageEncoder, ImageFormat};
use std::io::Cursor;

use super::formats::RasterCodec;
use super::metadata::{splice_jpeg_exif, splice_png_exif, ImageMetadata};
use crate::channel::WorkerFailure;

/// Largest edge an icon entry can have.
const MAX_ICON_SIZE: u32 = 256;

fn encode_failure(err: impl std::fmt::Display) -> WorkerFailure {
    WorkerFailure::new("EncodeError", format!("Failed to write image: {err}"))
}

/// Encodes `img` as `codec` with the given 0-100 quality, re-applying
/// `metadata` where the target format can carry it.
pub fn encode(
    img: &DynamicImage,
    codec: RasterCodec,
    quality: u8,
    metadata: &ImageMetadata,
) -> Result<Vec<u8>, WorkerFailure> {
    let mut out = Vec::new();

    match codec {
        RasterCodec::Image(ImageFormat::Jpeg) => {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            if let Some(icc) = &metadata.icc_profile {
                let _ = encoder.set_icc_profile(icc.clone());
            }
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(encode_failure)?;
            if let Some(exif) = &metadata.exif {
                if let Some(spliced) = splice_jpeg_exif(&out, exif) {
                    out = spliced;
                }
            }
        }
        RasterCodec::Image(ImageFormat::Png) => {
            let mut encoder = PngEncoder::new(&mut out);
            if let Some(icc) = &metadata.icc_profile {
                let _ = encoder.set_icc_profile(icc.clone());
            }
            png_compatible(img)
                .write_with_encoder(encoder)
                .map_err(encode_failure)?;
            if let Some(exif) = &metadata.exif {
                if let Some(spliced) = splice_png_exif(&out, exif) {
                    out = spliced;
                }
            }
        }
        RasterCodec::Image(ImageFormat::WebP) => {
            let mut encoder = WebPEncoder::new_lossless(&mut out);
            if let Some(icc) = &metadata.icc_profile {
                let _ = encoder.set_icc_profile(icc.clone());
            }
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(encoder)
                .map_err(encode_failure)?;
        }
        RasterCodec::Image(ImageFormat::Ico) | RasterCodec::Cursor => {
            let icon = fit_icon(img).to_rgba8();
            IcoEncoder::new(&mut out)
                .write_image(
                    icon.as_raw(),
                    icon.width(),
                    icon.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .map_err(encode_failure)?;
            if codec == RasterCodec::Cursor {
                // ICONDIR type: 1 = icon, 2 = cursor.
                out[2] = 2;
            }
        }
        RasterCodec::Pnm(subtype) => {
            let converted = match subtype {
                PnmSubtype::Bitmap(_) | PnmSubtype::Graymap(_) => {
                    DynamicImage::ImageLuma8(img.to_luma8())
                }
                PnmSubtype::Pixmap(_) => DynamicImage::ImageRgb8(img.to_rgb8()),
                PnmSubtype::ArbitraryMap => DynamicImage::ImageRgba8(img.to_rgba8()),
            };
            converted
                .write_with_encoder(PnmEncoder::new(&mut out).with_subtype(subtype))
                .map_err(encode_failure)?;
        }
        RasterCodec::Image(format @ (ImageFormat::Hdr | ImageFormat::Farbfeld)) => {
            let converted = if format == ImageFormat::Hdr {
                DynamicImage::ImageRgb32F(img.to_rgb32f())
            } else {
                DynamicImage::ImageRgba16(img.to_rgba16())
            };
            let mut cursor = Cursor::new(Vec::new());
            converted
                .write_to(&mut cursor, format)
                .map_err(encode_failure)?;
            out = cursor.into_inner();
        }
        RasterCodec::Image(
            format @ (ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::Tga
            | ImageFormat::Qoi
            | ImageFormat::Tiff),
        ) => {
            let mut cursor = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut cursor, format)
                .map_err(encode_failure)?;
            out = cursor.into_inner();
        }
        other => {
            return Err(WorkerFailure::new(
                "UnsupportedFormat",
                format!("{other:?} cannot be written"),
            ))
        }
    }

    Ok(out)
}

/// Encodes all frames into an endlessly looping GIF.
pub fn encode_animated_gif(frames: Vec<Frame>) -> Result<Vec<u8>, WorkerFailure> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(encode_failure)?;
        encoder.encode_frames(frames).map_err(encode_failure)?;
    }
    Ok(out)
}

fn png_compatible(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba16(img.to_rgba16())
        }
        other => other.clone(),
    }
}

/// Shrinks images larger than an icon entry allows, keeping the aspect ratio.
fn fit_icon(img: &DynamicImage) -> DynamicImage {
    if img.width() <= MAX_ICON_SIZE && img.height() <= MAX_ICON_SIZE {
        img.clone()
    } else {
        img.resize(MAX_ICON_SIZE, MAX_ICON_SIZE, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::raster::formats::codec_for;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255])))
    }

    #[test]
    fn test_every_writable_codec_encodes() {
        let img = sample(12, 7);
        for name in [
            ".png", ".jpg", ".webp", ".gif", ".bmp", ".ico", ".cur", ".tiff", ".pbm", ".pgm",
            ".ppm", ".pam", ".hdr", ".tga", ".qoi", ".ff",
        ] {
            let codec = codec_for(name).unwrap();
            let bytes = encode(&img, codec, 80, &ImageMetadata::default())
                .unwrap_or_else(|e| panic!("{name}: {e:?}"));
            assert!(!bytes.is_empty(), "{name} produced no bytes");
        }
    }

    #[test]
    fn test_cursor_marker_is_written() {
        let bytes = encode(&sample(16, 16), RasterCodec::Cursor, 90, &ImageMetadata::default())
            .unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 2, 0]);
    }

    #[test]
    fn test_large_icon_is_shrunk() {
        let bytes = encode(
            &sample(512, 256),
            RasterCodec::Image(ImageFormat::Ico),
            90,
            &ImageMetadata::default(),
        )
        .unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Ico).unwrap();
        assert_eq!(decoded.dimensions(), (256, 128));
    }

    #[test]
    fn test_quality_applies_to_jpeg_only() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8, 255])
        }));
        let none = ImageMetadata::default();
        let jpeg = RasterCodec::Image(ImageFormat::Jpeg);
        let rough = encode(&img, jpeg, 10, &none).unwrap();
        let fine = encode(&img, jpeg, 95, &none).unwrap();
        assert!(rough.len() < fine.len());

        let png = RasterCodec::Image(ImageFormat::Png);
        assert_eq!(encode(&img, png, 10, &none).unwrap(), encode(&img, png, 95, &none).unwrap());

        assert_eq!(codec_for(".avif"), None);
    }

    #[test]
    fn test_read_only_codec_is_rejected() {
        let err = encode(
            &sample(2, 2),
            RasterCodec::Image(ImageFormat::Dds),
            90,
            &ImageMetadata::default(),
        )
        .unwrap_err();
        assert_eq!(err.error_kind.as_deref(), Some("UnsupportedFormat"));
    }
}
