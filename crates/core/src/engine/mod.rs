//! Engine adapters.
//!
//! Four engine families sit behind the [`EngineAdapter`] trait:
//!
//! - [`raster`]: in-process image codecs
//! - [`media`]: ffmpeg/ffprobe child processes
//! - [`document`]: pandoc child processes
//! - [`remote`]: an HTTP job service for video
//!
//! Local engines ship every request through an
//! [`ExecutionChannel`](crate::channel::ExecutionChannel) to a fresh worker.

mod archive;
mod dispatch;
mod error;
mod status;
mod traits;
mod types;

pub mod document;
pub mod media;
pub mod raster;
pub mod remote;

pub use archive::{frame_entry_name, zip_entries};
pub use dispatch::{message_for, WorkerDispatcher};
pub use error::EngineError;
pub use status::{EngineStatus, StatusCell};
pub use traits::EngineAdapter;
pub use types::{
    format_from_name, ConversionJob, ConvertedFile, EngineKind, EngineOptions, ProgressSink,
    SourceFile,
};
