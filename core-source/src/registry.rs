//! # Source Plugin Registry
//!
//! Holds the loaded source plugins in insertion order plus at most one
//! selected plugin id. Reloading an id replaces the record in place.
//!
//! Every mutation publishes a [`SourceEvent`] so observers can re-read.

use core_runtime::events::{CoreEvent, EventBus, SourceEvent};
use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{Result, SourceError};
use crate::model::Track;
use crate::plugin::{PluginEntry, PluginInfo, PluginOrigin, SourcePlugin};
use crate::script::ScriptHost;

#[derive(Default)]
struct RegistryState {
    plugins: Vec<SourcePlugin>,
    selected: Option<String>,
}

pub struct SourceRegistry {
    host: ScriptHost,
    state: RwLock<RegistryState>,
    event_bus: Option<EventBus>,
}

impl SourceRegistry {
    pub fn new(host: ScriptHost) -> Self {
        Self {
            host,
            state: RwLock::new(RegistryState::default()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Executes plugin source text and registers the result.
    ///
    /// On failure the registry is left unchanged.
    #[instrument(skip(self, source), fields(origin = %origin))]
    pub fn load(&self, source: &str, origin: &PluginOrigin) -> Result<PluginInfo> {
        match self.host.load(source, origin) {
            Ok(plugin) => {
                let info = plugin.info().clone();
                self.insert(plugin);
                Ok(info)
            }
            Err(e) => {
                warn!(error = %e, "Plugin load failed");
                self.emit(SourceEvent::PluginLoadFailed {
                    origin: origin.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Registers an already-built plugin. Returns whether an existing plugin
    /// with the same id was replaced.
    pub fn insert(&self, plugin: SourcePlugin) -> bool {
        let plugin_id = plugin.id().to_string();
        let name = plugin.info().name.clone();

        let replaced = {
            let mut state = self.state.write();
            match state.plugins.iter_mut().find(|p| p.id() == plugin_id) {
                Some(slot) => {
                    *slot = plugin;
                    true
                }
                None => {
                    state.plugins.push(plugin);
                    false
                }
            }
        };

        info!(plugin_id = %plugin_id, name = %name, replaced, "Plugin registered");
        self.emit(SourceEvent::PluginLoaded {
            plugin_id,
            name,
            replaced,
        });
        replaced
    }

    /// All plugins in insertion order.
    pub fn list(&self) -> Vec<PluginEntry> {
        let state = self.state.read();
        state
            .plugins
            .iter()
            .map(|plugin| PluginEntry {
                selected: state.selected.as_deref() == Some(plugin.id()),
                plugin: plugin.clone(),
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<SourcePlugin> {
        self.state
            .read()
            .plugins
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    pub fn selected(&self) -> Option<SourcePlugin> {
        let state = self.state.read();
        let selected = state.selected.as_deref()?;
        state.plugins.iter().find(|p| p.id() == selected).cloned()
    }

    pub fn select(&self, id: &str) -> Result<()> {
        {
            let mut state = self.state.write();
            if !state.plugins.iter().any(|p| p.id() == id) {
                return Err(SourceError::PluginNotFound(id.to_string()));
            }
            state.selected = Some(id.to_string());
        }

        info!(plugin_id = id, "Plugin selected");
        self.emit(SourceEvent::SelectionChanged {
            plugin_id: Some(id.to_string()),
        });
        Ok(())
    }

    pub fn deselect(&self) {
        let previous = self.state.write().selected.take();
        if previous.is_some() {
            self.emit(SourceEvent::SelectionChanged { plugin_id: None });
        }
    }

    /// Removes a plugin, clearing the selection if it was selected.
    pub fn remove(&self, id: &str) -> Result<SourcePlugin> {
        let (removed, was_selected) = {
            let mut state = self.state.write();
            let index = state
                .plugins
                .iter()
                .position(|p| p.id() == id)
                .ok_or_else(|| SourceError::PluginNotFound(id.to_string()))?;
            let removed = state.plugins.remove(index);
            let was_selected = state.selected.as_deref() == Some(id);
            if was_selected {
                state.selected = None;
            }
            (removed, was_selected)
        };

        info!(plugin_id = id, "Plugin removed");
        self.emit(SourceEvent::PluginRemoved {
            plugin_id: id.to_string(),
        });
        if was_selected {
            self.emit(SourceEvent::SelectionChanged { plugin_id: None });
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.state.read().plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().plugins.is_empty()
    }

    /// Moves candidates served by the selected plugin to the front, keeping
    /// the relative order of both groups.
    pub fn prioritize(&self, candidates: Vec<Track>) -> Vec<Track> {
        let Some(selected) = self.state.read().selected.clone() else {
            return candidates;
        };

        let (mut preferred, rest): (Vec<Track>, Vec<Track>) = candidates
            .into_iter()
            .partition(|track| track.platform == selected);
        preferred.extend(rest);
        preferred
    }

    fn emit(&self, event: SourceEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Source(event)).ok();
        }
    }
}
