//! File entities: one source file, a target format and observable
//! conversion state.

mod entity;
mod error;
mod filename;
mod notify;

pub use entity::{FileEntity, FileSnapshot, FileState};
pub use error::FileError;
pub use filename::{render as render_filename, DEFAULT_TEMPLATE};
pub use notify::{Notification, NotificationLevel, NotificationLog, Notifier};
