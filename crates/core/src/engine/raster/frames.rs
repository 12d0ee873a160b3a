//! Frame extraction for multi-image containers (ICO, ANI, ICNS).

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::channel::WorkerFailure;

const ICONDIR_LEN: usize = 6;
const ICONDIRENTRY_LEN: usize = 16;
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff];

fn read_u16_le(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u32_be(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn malformed(container: &str, reason: impl std::fmt::Display) -> WorkerFailure {
    WorkerFailure::new("MalformedContainer", format!("Failed to read {container}: {reason}"))
}

fn no_frames(container: &str) -> WorkerFailure {
    WorkerFailure::new(
        "NoFramesFound",
        format!("Failed to read {container} -- no images found inside?"),
    )
}

/// Splits an ICO or CUR file into single-entry icon files, one per image.
pub fn split_icon_directory(bytes: &[u8]) -> Result<Vec<Vec<u8>>, WorkerFailure> {
    let kind = read_u16_le(bytes, 2).ok_or_else(|| malformed("ICO", "truncated header"))?;
    if read_u16_le(bytes, 0) != Some(0) || !(kind == 1 || kind == 2) {
        return Err(malformed("ICO", "not an icon directory"));
    }
    let count = read_u16_le(bytes, 4).unwrap_or(0) as usize;

    let mut icons = Vec::with_capacity(count);
    for index in 0..count {
        let at = ICONDIR_LEN + index * ICONDIRENTRY_LEN;
        let Some(entry) = bytes.get(at..at + ICONDIRENTRY_LEN) else {
            debug!(index, "Icon directory truncated");
            break;
        };
        let size = read_u32_le(entry, 8).unwrap_or(0) as usize;
        let offset = read_u32_le(entry, 12).unwrap_or(0) as usize;
        let Some(data) = offset
            .checked_add(size)
            .and_then(|end| bytes.get(offset..end))
        else {
            debug!(index, offset, size, "Icon entry points outside the file");
            continue;
        };

        // Rewrite as a standalone icon (type 1) with a single entry.
        let data_offset = (ICONDIR_LEN + ICONDIRENTRY_LEN) as u32;
        let mut icon = Vec::with_capacity(ICONDIR_LEN + ICONDIRENTRY_LEN + data.len());
        icon.extend_from_slice(&[0, 0, 1, 0, 1, 0]);
        icon.extend_from_slice(&entry[..12]);
        icon.extend_from_slice(&data_offset.to_le_bytes());
        icon.extend_from_slice(data);
        icons.push(icon);
    }

    Ok(icons)
}

/// Rewrites a cursor file as an icon file so the ICO decoder accepts it.
///
/// The cursor hotspot stored in each directory entry is left in place.
pub fn cursor_as_icon(bytes: &[u8]) -> Result<Vec<u8>, WorkerFailure> {
    if read_u16_le(bytes, 0) != Some(0) || read_u16_le(bytes, 2) != Some(2) {
        return Err(malformed("CUR", "not a cursor directory"));
    }
    let mut icon = bytes.to_vec();
    icon[2..4].copy_from_slice(&1u16.to_le_bytes());
    Ok(icon)
}

/// Extracts the `icon` chunks of an animated cursor (RIFF `ACON`).
pub fn split_animated_cursor(bytes: &[u8]) -> Result<Vec<Vec<u8>>, WorkerFailure> {
    if bytes.get(0..4) != Some(b"RIFF") || bytes.get(8..12) != Some(b"ACON") {
        return Err(malformed("ANI", "not a RIFF ACON file"));
    }

    let mut icons = Vec::new();
    collect_icon_chunks(bytes, 12, bytes.len(), &mut icons);
    Ok(icons)
}

fn collect_icon_chunks(bytes: &[u8], mut at: usize, end: usize, icons: &mut Vec<Vec<u8>>) {
    while at + 8 <= end {
        let id = &bytes[at..at + 4];
        let Some(len) = read_u32_le(bytes, at + 4).map(|l| l as usize) else {
            return;
        };
        let body_start = at + 8;
        let body_end = body_start.saturating_add(len).min(end);

        match id {
            b"LIST" if bytes.get(body_start..body_start + 4) == Some(b"fram") => {
                collect_icon_chunks(bytes, body_start + 4, body_end, icons);
            }
            b"icon" => {
                let mut icon = bytes[body_start..body_end].to_vec();
                // Cursor frames decode as icons.
                if icon.len() > 4 && icon[2] == 2 {
                    icon[2] = 1;
                }
                icons.push(icon);
            }
            _ => {}
        }

        // Chunks are padded to an even length.
        at = body_start.saturating_add(len + (len & 1));
    }
}

/// Extracts the embedded PNG and JPEG images of an ICNS bundle.
pub fn split_icon_bundle(bytes: &[u8]) -> Result<Vec<(ImageFormat, Vec<u8>)>, WorkerFailure> {
    if bytes.get(0..4) != Some(b"icns") {
        return Err(malformed("ICNS", "missing icns magic"));
    }
    let total = read_u32_be(bytes, 4)
        .map(|l| (l as usize).min(bytes.len()))
        .ok_or_else(|| malformed("ICNS", "truncated header"))?;

    let mut images = Vec::new();
    let mut at = 8;
    while at + 8 <= total {
        let Some(len) = read_u32_be(bytes, at + 4).map(|l| l as usize) else {
            break;
        };
        if len < 8 {
            break;
        }
        let data = &bytes[at + 8..(at + len).min(total)];
        if data.starts_with(PNG_SIGNATURE) {
            images.push((ImageFormat::Png, data.to_vec()));
        } else if data.starts_with(JPEG_SIGNATURE) {
            images.push((ImageFormat::Jpeg, data.to_vec()));
        } else {
            debug!(
                kind = %String::from_utf8_lossy(&bytes[at..at + 4]),
                "Skipping ICNS entry without an embedded image"
            );
        }
        at += len;
    }

    Ok(images)
}

/// Decodes every frame of a multi-image container.
pub fn decode_frames(from: &str, bytes: &[u8]) -> Result<Vec<DynamicImage>, WorkerFailure> {
    let container = from.trim_start_matches('.').to_uppercase();

    let encoded: Vec<(ImageFormat, Vec<u8>)> = match from {
        ".ico" => split_icon_directory(bytes)?
            .into_iter()
            .map(|icon| (ImageFormat::Ico, icon))
            .collect(),
        ".ani" => split_animated_cursor(bytes)?
            .into_iter()
            .map(|icon| (ImageFormat::Ico, icon))
            .collect(),
        ".icns" => split_icon_bundle(bytes)?,
        other => {
            return Err(WorkerFailure::new(
                "UnsupportedFormat",
                format!("{other} is not a multi-image container"),
            ))
        }
    };

    let mut frames = Vec::with_capacity(encoded.len());
    for (index, (format, data)) in encoded.into_iter().enumerate() {
        match image::load_from_memory_with_format(&data, format) {
            Ok(frame) => frames.push(frame),
            Err(e) => debug!(index, error = %e, "Skipping undecodable frame"),
        }
    }

    if frames.is_empty() {
        return Err(no_frames(&container));
    }
    Ok(frames)
}
