//! Format descriptors, categories and the capability registry.

mod registry;
mod types;

pub use registry::{EngineSnapshot, Registry, RegistryBuilder};
pub use types::{bare_extension, normalize_format, Category, CategoryFormats, FormatDescriptor};
