//! Raster format table.

use image::codecs::pnm::{PnmSubtype, SampleEncoding};
use image::ImageFormat;

use crate::format::FormatDescriptor;

/// How a raster format is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterCodec {
    /// Handled directly by an `image` codec.
    Image(ImageFormat),
    /// PNM family member with a fixed subtype.
    Pnm(PnmSubtype),
    /// Windows cursor: ICO container with a different type marker.
    Cursor,
    /// Animated cursor (RIFF `ACON`), read only.
    AnimatedCursor,
    /// Apple icon bundle, read only.
    IconBundle,
    /// Vector input rasterized before conversion.
    Svg,
}

impl RasterCodec {
    /// Containers that are exploded into one output per embedded frame.
    pub fn is_multi_frame(&self) -> bool {
        matches!(
            self,
            Self::Image(ImageFormat::Ico) | Self::AnimatedCursor | Self::IconBundle
        )
    }
}

/// Declared raster formats: `(name, from, to)`, native unless listed in
/// [`NON_NATIVE`].
const FORMATS: &[(&str, bool, bool)] = &[
    ("png", true, true),
    ("jpeg", true, true),
    ("jpg", true, true),
    ("jpe", true, true),
    ("jfif", true, true),
    ("webp", true, true),
    ("gif", true, true),
    ("bmp", true, true),
    ("ico", true, true),
    ("cur", true, true),
    ("ani", true, false),
    ("icns", true, false),
    ("tiff", true, true),
    ("tif", true, true),
    ("pnm", true, true),
    ("pbm", true, true),
    ("pgm", true, true),
    ("ppm", true, true),
    ("pam", true, true),
    ("hdr", true, true),
    ("tga", true, true),
    ("qoi", true, true),
    ("dds", true, false),
    ("ff", true, true),
    ("svg", true, false),
];

const NON_NATIVE: &[&str] = &["svg"];

/// Descriptors in declaration order.
pub fn descriptors() -> Vec<FormatDescriptor> {
    FORMATS
        .iter()
        .map(|&(name, from, to)| {
            if NON_NATIVE.contains(&name) {
                FormatDescriptor::non_native(name, from, to)
            } else {
                FormatDescriptor::new(name, from, to)
            }
        })
        .collect()
}

/// Codec for a normalized format name.
pub fn codec_for(format: &str) -> Option<RasterCodec> {
    let codec = match format.trim_start_matches('.') {
        "png" => RasterCodec::Image(ImageFormat::Png),
        "jpeg" | "jpg" | "jpe" | "jfif" => RasterCodec::Image(ImageFormat::Jpeg),
        "webp" => RasterCodec::Image(ImageFormat::WebP),
        "gif" => RasterCodec::Image(ImageFormat::Gif),
        "bmp" => RasterCodec::Image(ImageFormat::Bmp),
        "ico" => RasterCodec::Image(ImageFormat::Ico),
        "cur" => RasterCodec::Cursor,
        "ani" => RasterCodec::AnimatedCursor,
        "icns" => RasterCodec::IconBundle,
        "tiff" | "tif" => RasterCodec::Image(ImageFormat::Tiff),
        "pnm" | "ppm" => RasterCodec::Pnm(PnmSubtype::Pixmap(SampleEncoding::Binary)),
        "pbm" => RasterCodec::Pnm(PnmSubtype::Bitmap(SampleEncoding::Binary)),
        "pgm" => RasterCodec::Pnm(PnmSubtype::Graymap(SampleEncoding::Binary)),
        "pam" => RasterCodec::Pnm(PnmSubtype::ArbitraryMap),
        "hdr" => RasterCodec::Image(ImageFormat::Hdr),
        "tga" => RasterCodec::Image(ImageFormat::Tga),
        "qoi" => RasterCodec::Image(ImageFormat::Qoi),
        "dds" => RasterCodec::Image(ImageFormat::Dds),
        "ff" => RasterCodec::Image(ImageFormat::Farbfeld),
        "svg" => RasterCodec::Svg,
        _ => return None,
    };
    Some(codec)
}

/// The `image` format used to decode a codec's bytes.
pub fn decode_format(codec: RasterCodec) -> Option<ImageFormat> {
    match codec {
        RasterCodec::Image(format) => Some(format),
        RasterCodec::Pnm(_) => Some(ImageFormat::Pnm),
        RasterCodec::Cursor => Some(ImageFormat::Ico),
        RasterCodec::AnimatedCursor | RasterCodec::IconBundle | RasterCodec::Svg => None,
    }
}
