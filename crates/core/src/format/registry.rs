//! The capability registry: every engine adapter in a fixed order.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{normalize_format, Category, CategoryFormats};
use crate::config::Config;
use crate::engine::document::DocumentAdapter;
use crate::engine::media::MediaAdapter;
use crate::engine::raster::RasterAdapter;
use crate::engine::remote::RemoteAdapter;
use crate::engine::{EngineAdapter, EngineError, EngineKind, EngineStatus};
use crate::metrics;

/// Collects adapters in registration order.
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: Vec<Arc<dyn EngineAdapter>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn EngineAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            adapters: self.adapters,
        }
    }
}

/// Point-in-time view of one engine for the host.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub id: String,
    pub kind: EngineKind,
    pub status: EngineStatus,
    pub reports_progress: bool,
    pub format_count: usize,
}

/// Immutable, ordered set of engine adapters.
///
/// Built once and shared behind an `Arc`. Registration order is the
/// resolver's tie-break order.
pub struct Registry {
    adapters: Vec<Arc<dyn EngineAdapter>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds the standard engine set: raster, timed-media, remote-job (when
    /// configured) and document. Disabled engines are left out.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let engines = &config.engines;
        let mut builder = Self::builder();

        if engines.image.enabled {
            builder = builder.register(Arc::new(RasterAdapter::new(
                &engines.image,
                config.conversion.default_quality,
            )));
        }
        if engines.media.enabled {
            builder = builder.register(Arc::new(MediaAdapter::new(&engines.media)));
        }
        if let Some(remote) = &engines.remote {
            let adapter = RemoteAdapter::new(remote)
                .map_err(|e| EngineError::unavailable(crate::engine::remote::ENGINE_ID, e.to_string()))?;
            builder = builder.register(Arc::new(adapter));
        }
        if engines.document.enabled {
            builder = builder.register(Arc::new(DocumentAdapter::new(&engines.document)));
        }

        Ok(builder.build())
    }

    /// Adapters in registration order.
    pub fn adapters(&self) -> &[Arc<dyn EngineAdapter>] {
        &self.adapters
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.iter().find(|a| a.id() == id).cloned()
    }

    /// Adapters declaring `format`, in registration order.
    pub fn declaring(&self, format: &str) -> Vec<Arc<dyn EngineAdapter>> {
        let format = normalize_format(format);
        self.adapters
            .iter()
            .filter(|a| a.supports(&format))
            .cloned()
            .collect()
    }

    /// Natively writable formats of the adapters feeding `category`.
    pub fn category_formats(&self, category: Category) -> Vec<String> {
        let mut formats: Vec<String> = Vec::new();
        for adapter in self
            .adapters
            .iter()
            .filter(|a| a.kind().category() == category)
        {
            for descriptor in adapter.supported_formats() {
                if descriptor.to_supported
                    && descriptor.is_native
                    && !formats.contains(&descriptor.name)
                {
                    formats.push(descriptor.name.clone());
                }
            }
        }
        formats
    }

    /// Every category with its formats and cross-category targets.
    pub fn categories(&self) -> Vec<CategoryFormats> {
        Category::ALL
            .iter()
            .map(|category| CategoryFormats {
                category: *category,
                formats: self.category_formats(*category),
                can_convert_to: category.can_convert_to().to_vec(),
            })
            .collect()
    }

    /// Initializes every adapter concurrently. Returns the ids of engines
    /// that failed; the rest stay usable.
    pub async fn initialize_all(&self) -> Vec<String> {
        let results = join_all(self.adapters.iter().map(|adapter| async move {
            (adapter.id().to_string(), adapter.initialize().await)
        }))
        .await;

        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => info!(engine = %id, "Engine initialized"),
                Err(e) => {
                    warn!(engine = %id, error = %e, "Engine unavailable");
                    metrics::ENGINE_INIT_FAILURES
                        .with_label_values(&[id.as_str()])
                        .inc();
                    failed.push(id);
                }
            }
        }
        failed
    }

    pub fn snapshots(&self) -> Vec<EngineSnapshot> {
        self.adapters
            .iter()
            .map(|adapter| EngineSnapshot {
                id: adapter.id().to_string(),
                kind: adapter.kind(),
                status: adapter.status(),
                reports_progress: adapter.reports_progress(),
                format_count: adapter.supported_formats().len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.id().to_string()))
            .finish()
    }
}
