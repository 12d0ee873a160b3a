//! Carries ICC and EXIF metadata across a re-encode.

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

use crate::channel::WorkerFailure;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE_LEN: usize = 8;

/// Metadata read from a source image before decoding its pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub icc_profile: Option<Vec<u8>>,
    /// Raw TIFF-structured EXIF payload, without the `Exif\0\0` header.
    pub exif: Option<Vec<u8>>,
}

impl ImageMetadata {
    pub fn has_icc_profile(&self) -> bool {
        self.icc_profile.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.icc_profile.is_none() && self.exif.is_none()
    }
}

/// Decodes `bytes`, collecting ICC and EXIF data on the way.
pub fn decode_with_metadata(
    bytes: &[u8],
    format: ImageFormat,
) -> Result<(DynamicImage, ImageMetadata), WorkerFailure> {
    let reader = ImageReader::with_format(Cursor::new(bytes), format);
    let mut decoder = reader.into_decoder().map_err(decode_failure)?;

    let metadata = ImageMetadata {
        icc_profile: decoder.icc_profile().ok().flatten(),
        exif: decoder
            .exif_metadata()
            .ok()
            .flatten()
            .map(|exif| strip_exif_header(&exif).to_vec()),
    };

    let image = DynamicImage::from_decoder(decoder).map_err(decode_failure)?;
    Ok((image, metadata))
}

pub(super) fn decode_failure(err: image::ImageError) -> WorkerFailure {
    WorkerFailure::new("DecodeError", format!("Failed to read image: {err}"))
}

fn strip_exif_header(exif: &[u8]) -> &[u8] {
    exif.strip_prefix(EXIF_HEADER).unwrap_or(exif)
}

/// Inserts an APP1 EXIF segment after SOI (and after APP0, if present).
pub fn splice_jpeg_exif(jpeg: &[u8], exif: &[u8]) -> Option<Vec<u8>> {
    let segment_len = 2 + EXIF_HEADER.len() + exif.len();
    if segment_len > u16::MAX as usize || jpeg.get(0..2) != Some(&[0xff, 0xd8]) {
        return None;
    }

    let mut at = 2;
    if jpeg.get(2..4) == Some(&[0xff, 0xe0]) {
        let app0_len = u16::from_be_bytes([*jpeg.get(4)?, *jpeg.get(5)?]) as usize;
        at = 4 + app0_len;
        if at > jpeg.len() {
            return None;
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + segment_len + 2);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xff, 0xe1]);
    out.extend_from_slice(&(segment_len as u16).to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(exif);
    out.extend_from_slice(&jpeg[at..]);
    Some(out)
}

/// Inserts an `eXIf` chunk before the first `IDAT` chunk.
pub fn splice_png_exif(png: &[u8], exif: &[u8]) -> Option<Vec<u8>> {
    let mut at = PNG_SIGNATURE_LEN;
    loop {
        let len = u32::from_be_bytes(png.get(at..at + 4)?.try_into().ok()?) as usize;
        let kind = png.get(at + 4..at + 8)?;
        if kind == b"IDAT" {
            break;
        }
        at = at.checked_add(12 + len)?;
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(b"eXIf");
    hasher.update(exif);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(png.len() + exif.len() + 12);
    out.extend_from_slice(&png[..at]);
    out.extend_from_slice(&(exif.len() as u32).to_be_bytes());
    out.extend_from_slice(b"eXIf");
    out.extend_from_slice(exif);
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(&png[at..]);
    Some(out)
}
