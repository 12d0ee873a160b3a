pub mod channel;
pub mod config;
pub mod engine;
pub mod file;
pub mod format;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    ConversionJob, ConvertedFile, EngineAdapter, EngineError, EngineKind, EngineOptions,
    EngineStatus, ProgressSink, SourceFile,
};
pub use file::{FileEntity, FileError, FileSnapshot, FileState, Notification, NotificationLog};
pub use format::{Category, CategoryFormats, EngineSnapshot, FormatDescriptor, Registry};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStatus};
pub use resolver::{resolve, resolve_pair};
