//! # Source Context
//!
//! Owns one registry, its initialization gate, the resolution engine and
//! the plugin store. Hosts create one per process; tests create as many as
//! they like.
//!
//! ## Usage
//!
//! ```ignore
//! use core_source::{Quality, SourceContext, Track};
//!
//! let context = SourceContext::new(&config, event_bus)?;
//! context.bootstrap().await?;
//!
//! let resolution = context
//!     .resolve(candidates, Some(Quality::High), |track| {
//!         println!("trying {}", track.platform)
//!     })
//!     .await?;
//! ```

use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, SourceEvent};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::engine::{ResolutionAttempt, ResolutionEngine};
use crate::error::{Result, SourceError};
use crate::gate::{GateState, InitGate};
use crate::import::PluginImporter;
use crate::model::{Quality, Resolution, Track};
use crate::plugin::{PluginEntry, PluginInfo, PluginOrigin};
use crate::registry::SourceRegistry;
use crate::script::ScriptHost;
use crate::store::{PluginStore, StoredPlugin};

/// Outcome of startup plugin loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub loaded: usize,
    pub failed: usize,
}

pub struct SourceContext {
    registry: Arc<SourceRegistry>,
    gate: InitGate,
    engine: ResolutionEngine,
    store: PluginStore,
    /// Persisted records that failed to load at startup. They are written
    /// back on every save until replaced or removed.
    retained: Mutex<Vec<StoredPlugin>>,
    importer: PluginImporter,
    event_bus: EventBus,
}

impl SourceContext {
    pub fn new(config: &CoreConfig, event_bus: EventBus) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SourceError::Internal(e.to_string()))?;

        let host = ScriptHost::new(&config.script, config.resolver.rate_limit_message.clone());
        let registry = Arc::new(SourceRegistry::new(host).with_event_bus(event_bus.clone()));
        let gate = InitGate::new();
        let engine = ResolutionEngine::new(registry.clone(), gate.clone(), config.resolver.clone())?
            .with_event_bus(event_bus.clone());

        Ok(Self {
            registry,
            gate,
            engine,
            store: PluginStore::new(config.settings_store.clone()),
            retained: Mutex::new(Vec::new()),
            importer: PluginImporter::new(config.http_client.clone(), config.file_system.clone()),
            event_bus,
        })
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &InitGate {
        &self.gate
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Reloads the persisted plugin list and opens the gate.
    ///
    /// The gate opens even when some or all plugins fail to load, so
    /// resolutions end in `AllSourcesExhausted` instead of waiting forever.
    /// Calling this again after the gate has left `Pending` does nothing.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        if self.gate.state() != GateState::Pending {
            return Ok(BootstrapReport {
                loaded: self.registry.len(),
                failed: 0,
            });
        }

        let guard = self.gate.guard();
        let mut report = BootstrapReport::default();

        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read persisted plugins");
                report.failed += 1;
                if let Err(e) = self.store.back_up_unreadable().await {
                    warn!(error = %e, "Could not back up persisted plugins");
                }
                Vec::new()
            }
        };

        for plugin in stored {
            match self
                .load_blocking(plugin.script.clone(), PluginOrigin::Persisted)
                .await
            {
                Ok(info) => {
                    report.loaded += 1;
                    if plugin.is_selected {
                        if let Err(e) = self.registry.select(&info.id) {
                            warn!(plugin_id = %info.id, error = %e, "Could not restore selection");
                        }
                    }
                }
                Err(e) => {
                    warn!(plugin_id = %plugin.id, error = %e, "Persisted plugin failed to load");
                    report.failed += 1;
                    self.retained.lock().push(plugin);
                }
            }
        }

        guard.open();
        info!(loaded = report.loaded, failed = report.failed, "Source plugins ready");
        self.event_bus
            .emit(CoreEvent::Source(SourceEvent::SourcesReady {
                loaded: report.loaded,
                failed: report.failed,
            }))
            .ok();

        Ok(report)
    }

    /// Loads plugin source text supplied by the host and persists it.
    pub async fn import_source(&self, source: String) -> Result<PluginInfo> {
        let info = self.load_blocking(source, PluginOrigin::Inline).await?;
        self.persist().await?;
        Ok(info)
    }

    #[instrument(skip(self))]
    pub async fn import_from_url(&self, url: &str) -> Result<PluginInfo> {
        let source = self.importer.fetch_url(url).await.map_err(|e| {
            self.report_import_failure(url, &e);
            e
        })?;
        let info = self
            .load_blocking(source, PluginOrigin::Url(url.to_string()))
            .await?;
        self.persist().await?;
        Ok(info)
    }

    pub async fn import_from_file(&self, path: &Path) -> Result<PluginInfo> {
        let origin = PluginOrigin::File(path.to_path_buf());
        let source = self.importer.read_file(path).await.map_err(|e| {
            self.report_import_failure(&origin.to_string(), &e);
            e
        })?;
        let info = self.load_blocking(source, origin).await?;
        self.persist().await?;
        Ok(info)
    }

    pub fn plugins(&self) -> Vec<PluginEntry> {
        self.registry.list()
    }

    /// Persisted plugins that failed to load and are kept in storage.
    pub fn unloaded_plugins(&self) -> Vec<StoredPlugin> {
        self.retained.lock().clone()
    }

    pub async fn select_plugin(&self, id: &str) -> Result<()> {
        self.registry.select(id)?;
        self.persist().await
    }

    pub async fn deselect_plugin(&self) -> Result<()> {
        self.registry.deselect();
        self.persist().await
    }

    /// Removes a loaded plugin, or forgets a stored one that failed to load.
    pub async fn remove_plugin(&self, id: &str) -> Result<()> {
        let loaded = self.registry.remove(id);
        let dropped = {
            let mut retained = self.retained.lock();
            let before = retained.len();
            retained.retain(|record| record.id != id);
            retained.len() != before
        };
        if let Err(e) = loaded {
            if !dropped {
                return Err(e);
            }
        }
        self.persist().await
    }

    pub async fn resolve<F>(
        &self,
        candidates: Vec<Track>,
        quality: Option<Quality>,
        on_source_switch: F,
    ) -> Result<Resolution>
    where
        F: FnMut(&Track),
    {
        self.engine.resolve(candidates, quality, on_source_switch).await
    }

    pub async fn resolve_attempt<F>(
        &self,
        attempt: &mut ResolutionAttempt,
        on_source_switch: F,
    ) -> Result<Resolution>
    where
        F: FnMut(&Track),
    {
        self.engine.resolve_attempt(attempt, on_source_switch).await
    }

    /// Script evaluation is CPU-bound, so it runs off the async workers.
    async fn load_blocking(&self, source: String, origin: PluginOrigin) -> Result<PluginInfo> {
        let registry = self.registry.clone();
        let info = tokio::task::spawn_blocking(move || registry.load(&source, &origin))
            .await
            .map_err(|e| SourceError::Internal(format!("plugin load panicked: {}", e)))??;
        self.retained.lock().retain(|record| record.id != info.id);
        Ok(info)
    }

    async fn persist(&self) -> Result<()> {
        let retained = self.retained.lock().clone();
        self.store.save_registry(&self.registry, &retained).await
    }

    fn report_import_failure(&self, origin: &str, error: &SourceError) {
        warn!(origin, error = %error, "Plugin import failed");
        self.event_bus
            .emit(CoreEvent::Source(SourceEvent::PluginLoadFailed {
                origin: origin.to_string(),
                message: error.to_string(),
            }))
            .ok();
    }
}
