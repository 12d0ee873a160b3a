//! SVG rasterization.
//!
//! Renders an SVG document into an intermediate PNG at its declared size,
//! or at [`FALLBACK_SIZE`] when the document declares none.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use resvg::{tiny_skia, usvg};

use crate::channel::WorkerFailure;

/// Square size used when the root element has no width, height or viewBox.
pub const FALLBACK_SIZE: u32 = 512;

/// Largest canvas side rendered, in pixels.
pub const MAX_SIZE: u32 = 16384;

static SVG_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b[^>]*>").unwrap());

static SIZE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(width|height|viewBox)\s*=").unwrap());

/// Whether the root `<svg>` element declares its dimensions.
pub fn declares_size(svg: &[u8]) -> bool {
    let text = String::from_utf8_lossy(svg);
    SVG_ROOT
        .find(&text)
        .is_some_and(|tag| SIZE_ATTR.is_match(tag.as_str()))
}

/// Renders `svg` to PNG bytes, returning them with the canvas size.
pub fn rasterize(svg: &[u8]) -> Result<(Vec<u8>, u32, u32), WorkerFailure> {
    let tree = usvg::Tree::from_data(svg, &usvg::Options::default())
        .map_err(|e| WorkerFailure::new("SvgParseError", format!("Failed to parse SVG: {e}")))?;

    let size = tree.size();
    let (width, height) = if declares_size(svg) {
        (size.width().ceil(), size.height().ceil())
    } else {
        (FALLBACK_SIZE as f32, FALLBACK_SIZE as f32)
    };
    if width > MAX_SIZE as f32 || height > MAX_SIZE as f32 {
        return Err(WorkerFailure::new(
            "SvgRenderError",
            format!("SVG canvas {width}x{height} exceeds the {MAX_SIZE}px limit per side"),
        ));
    }
    let (width, height) = (width as u32, height as u32);
    if width == 0 || height == 0 {
        return Err(WorkerFailure::new(
            "SvgRenderError",
            format!("Invalid SVG dimensions: {width}x{height}"),
        ));
    }

    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        WorkerFailure::new(
            "SvgRenderError",
            format!("Failed to allocate a {width}x{height} canvas"),
        )
    })?;
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let png = pixmap
        .encode_png()
        .map_err(|e| WorkerFailure::new("SvgRenderError", e.to_string()))?;
    Ok((png, width, height))
}
