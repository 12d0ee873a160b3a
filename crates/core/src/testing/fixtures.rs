//! Image fixtures: small PNGs and hand-built icon containers.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// An icon directory with PNG-encoded entries of the given square sizes.
pub fn ico_with_sizes(sizes: &[u32], kind: u16) -> Vec<u8> {
    let images: Vec<Vec<u8>> = sizes
        .iter()
        .map(|&s| png_bytes(s, s, [200, 10, 10, 255]))
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&(sizes.len() as u16).to_le_bytes());

    let mut offset = 6 + 16 * sizes.len() as u32;
    for (size, data) in sizes.iter().zip(&images) {
        let dim = if *size >= 256 { 0 } else { *size as u8 };
        out.extend_from_slice(&[dim, dim, 0, 0]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        offset += data.len() as u32;
    }
    for data in images {
        out.extend_from_slice(&data);
    }
    out
}

/// A RIFF ACON file with one `icon` chunk per cursor.
pub fn ani_with_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut list = b"fram".to_vec();
    for frame in frames {
        list.extend_from_slice(b"icon");
        list.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        list.extend_from_slice(frame);
        if frame.len() % 2 == 1 {
            list.push(0);
        }
    }

    let mut body = b"ACON".to_vec();
    body.extend_from_slice(b"LIST");
    body.extend_from_slice(&(list.len() as u32).to_le_bytes());
    body.extend_from_slice(&list);

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// An ICNS bundle with one PNG entry per size plus a TOC entry.
pub fn icns_with_pngs(sizes: &[u32]) -> Vec<u8> {
    let mut entries = Vec::new();
    entries.extend_from_slice(b"TOC ");
    entries.extend_from_slice(&8u32.to_be_bytes());
    for size in sizes {
        let data = png_bytes(*size, *size, [0, 0, 255, 255]);
        entries.extend_from_slice(b"ic07");
        entries.extend_from_slice(&(data.len() as u32 + 8).to_be_bytes());
        entries.extend_from_slice(&data);
    }

    let mut out = b"icns".to_vec();
    out.extend_from_slice(&(entries.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(&entries);
    out
}
