//! Testing utilities and mock implementations.
//!
//! This module provides doubles for the engine seams, so conversion flows can
//! be tested without ffmpeg, pandoc or a remote job service.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{fixtures, MockEngine};
//!
//! let engine = MockEngine::new("image", EngineKind::Raster)
//!     .with_format("png", true, true, true)
//!     .fail_with("DecodeError", "truncated file");
//!
//! let png = fixtures::png_bytes(4, 4, [255, 0, 0, 255]);
//! ```

mod mock_engine;
mod mock_toolchain;

pub mod fixtures;

pub use mock_engine::MockEngine;
pub use mock_toolchain::MockToolchain;
