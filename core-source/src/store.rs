//! Persisted plugin list, stored as JSON in the host settings store.

use bridge_traits::storage::SettingsStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SourceError};
use crate::registry::SourceRegistry;

pub const PLUGINS_KEY: &str = "source_plugins";
/// Where an unparseable plugin list is copied before it gets rewritten.
pub const UNREADABLE_PLUGINS_KEY: &str = "source_plugins.unreadable";

/// One persisted plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPlugin {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub src_url: String,
    pub script: String,
    #[serde(default)]
    pub is_selected: bool,
}

pub struct PluginStore {
    settings: Arc<dyn SettingsStore>,
}

impl PluginStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Reads the persisted list. A missing key is an empty list.
    pub async fn load(&self) -> Result<Vec<StoredPlugin>> {
        let Some(json) = self.settings.get_string(PLUGINS_KEY).await? else {
            return Ok(Vec::new());
        };

        let plugins: Vec<StoredPlugin> = serde_json::from_str(&json)
            .map_err(|e| SourceError::Persistence(format!("invalid plugin list: {}", e)))?;
        debug!(count = plugins.len(), "Read persisted plugins");
        Ok(plugins)
    }

    pub async fn save(&self, plugins: &[StoredPlugin]) -> Result<()> {
        let json = serde_json::to_string(plugins)
            .map_err(|e| SourceError::Persistence(e.to_string()))?;
        self.settings.set_string(PLUGINS_KEY, &json).await?;
        debug!(count = plugins.len(), "Persisted plugins");
        Ok(())
    }

    /// Writes the registry's current script plugins followed by `retained`,
    /// the stored records that could not be loaded this session.
    pub async fn save_registry(
        &self,
        registry: &SourceRegistry,
        retained: &[StoredPlugin],
    ) -> Result<()> {
        self.save(&merge_retained(snapshot(registry), retained, registry))
            .await
    }

    /// Copies the raw value under [`PLUGINS_KEY`] to
    /// [`UNREADABLE_PLUGINS_KEY`] so a later save does not destroy it.
    pub async fn back_up_unreadable(&self) -> Result<()> {
        if let Some(raw) = self.settings.get_string(PLUGINS_KEY).await? {
            self.settings
                .set_string(UNREADABLE_PLUGINS_KEY, &raw)
                .await?;
            warn!(key = UNREADABLE_PLUGINS_KEY, "Backed up unreadable plugin list");
        }
        Ok(())
    }
}

/// Appends retained records whose id the registry does not hold. A retained
/// record loses its selection once the registry has one.
fn merge_retained(
    mut plugins: Vec<StoredPlugin>,
    retained: &[StoredPlugin],
    registry: &SourceRegistry,
) -> Vec<StoredPlugin> {
    let has_selection = registry.selected().is_some();
    for record in retained {
        if registry.get(&record.id).is_some() || plugins.iter().any(|p| p.id == record.id) {
            continue;
        }
        let mut record = record.clone();
        if has_selection {
            record.is_selected = false;
        }
        plugins.push(record);
    }
    plugins
}

/// Script-backed plugins in registry order. Host-inserted plugins without
/// source text cannot be reloaded and are left out.
pub fn snapshot(registry: &SourceRegistry) -> Vec<StoredPlugin> {
    registry
        .list()
        .into_iter()
        .filter(|entry| !entry.plugin.script().is_empty())
        .map(|entry| {
            let info = entry.plugin.info();
            StoredPlugin {
                id: info.id.clone(),
                name: info.name.clone(),
                author: info.author.clone(),
                version: info.version.clone(),
                src_url: info.src_url.clone(),
                script: entry.plugin.script().to_string(),
                is_selected: entry.selected,
            }
        })
        .collect()
}
