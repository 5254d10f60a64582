//! Source plugin records and the resolution capability seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{MusicUrl, Quality, Track};

/// Resolves a track to a playable URL.
///
/// Implemented by [`ScriptResolver`](crate::script::ScriptResolver) for
/// loaded scripts; hosts may register native implementations through
/// [`SourceRegistry::insert`](crate::registry::SourceRegistry::insert).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicUrlResolver: Send + Sync {
    async fn get_music_url(&self, track: &Track, quality: Quality) -> Result<MusicUrl>;
}

/// Identity fields exported by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub src_url: String,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Where plugin source text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Url(String),
    File(PathBuf),
    /// Re-loaded from the persisted plugin list.
    Persisted,
    /// Supplied directly by the host.
    Inline,
}

impl PluginOrigin {
    pub fn src_url(&self) -> Option<&str> {
        match self {
            PluginOrigin::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOrigin::Url(url) => f.write_str(url),
            PluginOrigin::File(path) => {
                let name = path.to_string_lossy();
                f.write_str(core_runtime::logging::strip_path(&name))
            }
            PluginOrigin::Persisted => f.write_str("persisted"),
            PluginOrigin::Inline => f.write_str("inline"),
        }
    }
}

/// A loaded source plugin. Immutable; reloading the same id replaces it.
#[derive(Clone)]
pub struct SourcePlugin {
    info: PluginInfo,
    script: String,
    resolver: Option<Arc<dyn MusicUrlResolver>>,
}

impl SourcePlugin {
    pub fn new(
        info: PluginInfo,
        script: impl Into<String>,
        resolver: Option<Arc<dyn MusicUrlResolver>>,
    ) -> Self {
        Self {
            info,
            script: script.into(),
            resolver,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Source text the plugin was loaded from. Empty for native plugins.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// `None` when the plugin exports no `getMusicUrl`.
    pub fn resolver(&self) -> Option<Arc<dyn MusicUrlResolver>> {
        self.resolver.clone()
    }

    pub fn can_resolve(&self) -> bool {
        self.resolver.is_some()
    }
}

impl fmt::Debug for SourcePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePlugin")
            .field("info", &self.info)
            .field("script_len", &self.script.len())
            .field("can_resolve", &self.can_resolve())
            .finish()
    }
}

/// Registry view of a plugin.
#[derive(Debug, Clone)]
pub struct PluginEntry {
    pub plugin: SourcePlugin,
    pub selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display_hides_directories() {
        let origin = PluginOrigin::File(PathBuf::from("/home/user/sources/kw.rhai"));
        assert_eq!(origin.to_string(), "kw.rhai");
        assert_eq!(origin.src_url(), None);

        let url = PluginOrigin::Url("https://example.com/kw.rhai".to_string());
        assert_eq!(url.src_url(), Some("https://example.com/kw.rhai"));
    }

    #[tokio::test]
    async fn test_plugin_delegates_to_resolver() {
        let mut resolver = MockMusicUrlResolver::new();
        resolver.expect_get_music_url().times(1).returning(|track, quality| {
            Ok(MusicUrl {
                url: format!("https://cdn.example.com/{}", track.id),
                quality,
            })
        });

        let plugin = SourcePlugin::new(PluginInfo::new("kw"), "", Some(Arc::new(resolver)));
        assert!(plugin.can_resolve());

        let url = plugin
            .resolver()
            .unwrap()
            .get_music_url(&Track::new("kw", "7"), Quality::High)
            .await
            .unwrap();
        assert_eq!(url.url, "https://cdn.example.com/7");
        assert_eq!(url.quality, Quality::High);
    }
}
