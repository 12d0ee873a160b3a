//! Conversion orchestrator implementation.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::{ConvertedFile, EngineOptions, EngineStatus};
use crate::file::{FileEntity, FileError, FileSnapshot, Notification, NotificationLog, Notifier};
use crate::format::{CategoryFormats, EngineSnapshot, Registry};
use crate::resolver::resolve;

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus};

/// Drives file entities for the host.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<Registry>,
    notifications: Arc<NotificationLog>,
    files: Arc<RwLock<HashMap<String, Arc<FileEntity>>>>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: OrchestratorConfig, registry: Arc<Registry>) -> Self {
        let notifications = Arc::new(NotificationLog::new(config.notification_capacity));
        Self {
            config,
            registry,
            notifications,
            files: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Initializes every engine. Returns the ids of engines that failed.
    pub async fn initialize(&self) -> Vec<String> {
        self.registry.initialize_all().await
    }

    /// Registers a new file and returns it.
    pub async fn submit(&self, name: &str, bytes: impl Into<Arc<[u8]>>, to: &str) -> Arc<FileEntity> {
        let notifier: Arc<dyn Notifier> = self.notifications.clone();
        let file = Arc::new(FileEntity::new(name, bytes, to, &self.registry, notifier));

        info!(
            id = file.id(),
            file = file.name(),
            to = %file.target(),
            candidates = file.candidates().len(),
            "File submitted"
        );
        self.files
            .write()
            .await
            .insert(file.id().to_string(), Arc::clone(&file));
        file
    }

    pub async fn get(&self, id: &str) -> Result<Arc<FileEntity>, OrchestratorError> {
        self.files
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::FileNotFound(id.to_string()))
    }

    /// Snapshots of every file, oldest first.
    pub async fn list(&self) -> Vec<FileSnapshot> {
        let mut snapshots: Vec<FileSnapshot> = self
            .files
            .read()
            .await
            .values()
            .map(|file| file.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    pub async fn set_target(&self, id: &str, to: &str) -> Result<FileSnapshot, OrchestratorError> {
        let file = self.get(id).await?;
        file.set_target(to);
        debug!(id, to = %file.target(), "Target changed");
        Ok(file.snapshot())
    }

    /// Starts a conversion in the background.
    ///
    /// Resolution and re-entry are checked up front so the caller gets those
    /// errors directly. Later failures reach the notification log.
    pub async fn start(&self, id: &str, options: EngineOptions) -> Result<(), OrchestratorError> {
        let file = self.get(id).await?;
        Self::precheck(&file)?;

        tokio::spawn(async move {
            if let Err(e) = file.convert(options).await {
                debug!(id = file.id(), error = %e, "Background conversion ended with error");
            }
        });
        Ok(())
    }

    /// Converts and waits for the outcome. `None` means it was cancelled.
    pub async fn convert(
        &self,
        id: &str,
        options: EngineOptions,
    ) -> Result<Option<Arc<ConvertedFile>>, OrchestratorError> {
        let file = self.get(id).await?;
        Ok(file.convert(options).await?)
    }

    pub async fn cancel(&self, id: &str) -> Result<(), OrchestratorError> {
        let file = self.get(id).await?;
        Ok(file.cancel().await?)
    }

    /// Forgets a file, cancelling its conversion first.
    pub async fn discard(&self, id: &str) -> Result<(), OrchestratorError> {
        let file = self
            .files
            .write()
            .await
            .remove(id)
            .ok_or_else(|| OrchestratorError::FileNotFound(id.to_string()))?;

        if file.is_processing() {
            if let Err(e) = file.cancel().await {
                warn!(id, error = %e, "Cancel during discard failed");
            }
        }
        info!(id, file = file.name(), "File discarded");
        Ok(())
    }

    /// Download name and result of a converted file.
    pub async fn download(&self, id: &str) -> Result<(String, Arc<ConvertedFile>), OrchestratorError> {
        let file = self.get(id).await?;
        let result = file
            .result()
            .ok_or_else(|| OrchestratorError::NoResult(id.to_string()))?;
        let name = file
            .download_name(&self.config.filename_format, Utc::now())
            .ok_or_else(|| OrchestratorError::NoResult(id.to_string()))?;
        Ok((name, result))
    }

    pub fn categories(&self) -> Vec<CategoryFormats> {
        self.registry.categories()
    }

    pub fn engines(&self) -> Vec<EngineSnapshot> {
        self.registry.snapshots()
    }

    pub fn notifications(&self, limit: usize) -> Vec<Notification> {
        self.notifications.recent(limit)
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let files = self.files.read().await;
        let engines = self.registry.snapshots();
        OrchestratorStatus {
            files: files.len(),
            processing: files.values().filter(|f| f.is_processing()).count(),
            engines_ready: engines
                .iter()
                .filter(|e| e.status == EngineStatus::Ready)
                .count(),
            engines_failed: engines
                .iter()
                .filter(|e| matches!(e.status, EngineStatus::Failed { .. }))
                .count(),
        }
    }

    fn precheck(file: &FileEntity) -> Result<(), FileError> {
        if file.candidates().is_empty() {
            return Err(FileError::NoConverters {
                file: file.name().to_string(),
            });
        }
        if resolve(file).is_none() {
            return Err(FileError::NoConverterFound {
                from: file.source().format.clone(),
                to: file.target(),
            });
        }
        if file.is_processing() {
            return Err(FileError::AlreadyProcessing {
                file: file.name().to_string(),
            });
        }
        Ok(())
    }
}
