//! # Core Configuration Module
//!
//! Provides configuration management for the resolution and tag-reading cores.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges plus tuning for each subsystem. It
//! enforces fail-fast validation so a misconfigured core never starts.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - Required for persisting the source plugin list
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - Plugin import from URLs (desktop default: reqwest)
//! - `FileSystemAccess` - Tag reading and plugin import from files (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled, desktop defaults for all
//! three bridges are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, ResolverConfig};
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/app-data")
//!     .resolver(ResolverConfig::default().with_quality_downgrade(true))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Fails: no data directory
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing data directory");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient, SettingsStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Quality names accepted by `ResolverConfig::default_quality`, lowest first.
pub const QUALITY_NAMES: [&str; 4] = ["128k", "320k", "flac", "flac24bit"];

/// Default chunk size for streaming tag reads (256 KiB).
pub const DEFAULT_TAG_CHUNK_SIZE: usize = 256 * 1024;

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for the settings database and other app data
    pub data_dir: PathBuf,

    /// HTTP client used to import plugins from URLs
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// File system access used by the tag reader and file imports
    pub file_system: Option<Arc<dyn FileSystemAccess>>,

    /// Settings storage holding the persisted plugin list (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Resolution engine tuning
    pub resolver: ResolverConfig,

    /// Plugin script sandbox limits
    pub script: ScriptConfig,

    /// Tag reader tuning
    pub tag_reader: TagReaderConfig,

    /// Per-subscriber buffer of the event bus
    pub event_bus_capacity: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "file_system",
                &self
                    .file_system
                    .as_ref()
                    .map(|_| "FileSystemAccess { ... }"),
            )
            .field("settings_store", &"SettingsStore { ... }")
            .field("resolver", &self.resolver)
            .field("script", &self.script)
            .field("tag_reader", &self.tag_reader)
            .field("event_bus_capacity", &self.event_bus_capacity)
            .finish()
    }
}

// ============================================================================
// Resolver configuration
// ============================================================================

fn default_quality() -> String {
    "128k".to_string()
}

fn default_rate_limit_message() -> String {
    "too many requests".to_string()
}

/// Resolution engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Quality used when a request does not name one
    #[serde(default = "default_quality")]
    pub default_quality: String,

    /// Use the best lower quality when a source lacks the requested one.
    /// Off by default: such sources are skipped.
    #[serde(default)]
    pub allow_quality_downgrade: bool,

    /// Give up waiting for startup plugin loading after this many milliseconds
    #[serde(default)]
    pub init_timeout_ms: Option<u64>,

    /// Thrown plugin message (compared case-insensitively) that means "rate limited"
    #[serde(default = "default_rate_limit_message")]
    pub rate_limit_message: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_quality: default_quality(),
            allow_quality_downgrade: false,
            init_timeout_ms: None,
            rate_limit_message: default_rate_limit_message(),
        }
    }
}

impl ResolverConfig {
    pub fn with_default_quality(mut self, quality: impl Into<String>) -> Self {
        self.default_quality = quality.into();
        self
    }

    pub fn with_quality_downgrade(mut self, allow: bool) -> Self {
        self.allow_quality_downgrade = allow;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_rate_limit_message(mut self, message: impl Into<String>) -> Self {
        self.rate_limit_message = message.into();
        self
    }

    /// Startup wait bound, if any.
    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if !QUALITY_NAMES.contains(&self.default_quality.as_str()) {
            return Err(Error::Config(format!(
                "Unknown default quality '{}'. Expected one of: {}",
                self.default_quality,
                QUALITY_NAMES.join(", ")
            )));
        }

        if self.rate_limit_message.trim().is_empty() {
            return Err(Error::Config(
                "Rate limit message cannot be empty".to_string(),
            ));
        }

        if self.init_timeout_ms == Some(0) {
            return Err(Error::Config(
                "Init timeout must be greater than 0ms when set".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Script sandbox configuration
// ============================================================================

fn default_max_operations() -> u64 {
    5_000_000
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_string_size() -> usize {
    4 * 1024 * 1024
}

fn default_max_collection_size() -> usize {
    100_000
}

fn default_max_expr_depth() -> usize {
    128
}

/// Resource limits applied to every plugin script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Maximum operations per load or call
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum function call depth
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum string length in bytes
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum number of map entries
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,

    /// Maximum expression nesting depth
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
            max_expr_depth: default_max_expr_depth(),
        }
    }
}

impl ScriptConfig {
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("max_operations", self.max_operations as usize),
            ("max_call_levels", self.max_call_levels),
            ("max_string_size", self.max_string_size),
            ("max_array_size", self.max_array_size),
            ("max_map_size", self.max_map_size),
            ("max_expr_depth", self.max_expr_depth),
        ];

        for (name, value) in limits {
            if value == 0 {
                return Err(Error::Config(format!(
                    "Script limit '{}' must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tag reader configuration
// ============================================================================

fn default_chunk_size() -> usize {
    DEFAULT_TAG_CHUNK_SIZE
}

/// Tag reader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReaderConfig {
    /// Bytes fetched per refill of the byte cursor
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for TagReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl TagReaderConfig {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "Tag reader chunk size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_size > 64 * 1024 * 1024 {
            return Err(Error::Config(
                "Tag reader chunk size exceeds maximum of 64 MiB".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data directory is not empty
    /// - Event bus capacity is in range
    /// - Every sub-config is valid
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.event_bus_capacity > 100_000 {
            return Err(Error::Config(
                "Event bus capacity exceeds maximum of 100,000 events".to_string(),
            ));
        }

        self.resolver.validate()?;
        self.script.validate()?;
        self.tag_reader.validate()?;

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required to persist source plugins. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = data_dir.join("settings.db");

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so hop to a plain thread there.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    Some(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Option<Arc<dyn FileSystemAccess>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    resolver: Option<ResolverConfig>,
    script: Option<ScriptConfig>,
    tag_reader: Option<TagReaderConfig>,
    event_bus_capacity: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the data directory.
    ///
    /// The desktop settings database is created here as `settings.db`.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().data_dir("/path/to/app-data");
    /// ```
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled. Without it, URL imports fail with
    /// a missing-capability error.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the settings store implementation (required).
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the resolution engine configuration.
    pub fn resolver(mut self, config: ResolverConfig) -> Self {
        self.resolver = Some(config);
        self
    }

    /// Sets the plugin sandbox limits.
    pub fn script(mut self, config: ScriptConfig) -> Self {
        self.script = Some(config);
        self
    }

    /// Sets the tag reader configuration.
    pub fn tag_reader(mut self, config: TagReaderConfig) -> Self {
        self.tag_reader = Some(config);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100 events
    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = Some(capacity);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if the data directory or settings store is missing,
    /// or any value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&data_dir)?,
        };

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        let file_system = self.file_system.or_else(provide_default_file_system);

        let config = CoreConfig {
            data_dir,
            http_client,
            file_system,
            settings_store,
            resolver: self.resolver.unwrap_or_default(),
            script: self.script.unwrap_or_default(),
            tag_reader: self.tag_reader.unwrap_or_default(),
            event_bus_capacity: self
                .event_bus_capacity
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::BridgeError;

    struct MockSettingsStore;

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn set_string(
            &self,
            _key: &str,
            _value: &str,
        ) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> std::result::Result<Option<String>, BridgeError> {
            Ok(None)
        }

        async fn set_bool(&self, _key: &str, _value: bool) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn get_bool(&self, _key: &str) -> std::result::Result<Option<bool>, BridgeError> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> std::result::Result<(), BridgeError> {
            Ok(())
        }

        async fn has_key(&self, _key: &str) -> std::result::Result<bool, BridgeError> {
            Ok(false)
        }

        async fn list_keys(&self) -> std::result::Result<Vec<String>, BridgeError> {
            Ok(Vec::new())
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .data_dir("/app-data")
            .settings_store(Arc::new(MockSettingsStore))
    }

    #[test]
    fn test_builder_requires_data_dir() {
        let result = CoreConfig::builder()
            .settings_store(Arc::new(MockSettingsStore))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Data directory is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let result = CoreConfig::builder().data_dir("/app-data").build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("SettingsStore"));
        assert!(err_msg.contains("source plugins"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", std::process::id()));
        std::fs::create_dir_all(&base).unwrap();

        let config = CoreConfig::builder()
            .data_dir(&base)
            .build()
            .expect("desktop defaults should succeed");

        assert!(config.http_client.is_some());
        assert!(config.file_system.is_some());

        let settings = config.settings_store.clone();
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            settings.set_string("source_plugins", "[]").await.unwrap();
            let value = settings.get_string("source_plugins").await.unwrap();
            assert_eq!(value.as_deref(), Some("[]"));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/app-data"));
        assert_eq!(config.resolver, ResolverConfig::default());
        assert_eq!(config.resolver.default_quality, "128k");
        assert!(!config.resolver.allow_quality_downgrade);
        assert_eq!(config.resolver.rate_limit_message, "too many requests");
        assert_eq!(config.tag_reader.chunk_size, 256 * 1024);
        assert_eq!(config.event_bus_capacity, 100);
    }

    #[test]
    fn test_rejects_unknown_default_quality() {
        let result = builder()
            .resolver(ResolverConfig::default().with_default_quality("999k"))
            .build();

        assert!(result.unwrap_err().to_string().contains("Unknown default quality"));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let result = builder()
            .tag_reader(TagReaderConfig::with_chunk_size(0))
            .build();
        assert!(result.unwrap_err().to_string().contains("chunk size"));

        let script = ScriptConfig {
            max_call_levels: 0,
            ..ScriptConfig::default()
        };
        let result = builder().script(script).build();
        assert!(result.unwrap_err().to_string().contains("max_call_levels"));

        let result = builder().event_bus_capacity(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_resolver_init_timeout() {
        let resolver = ResolverConfig::default().with_init_timeout(Duration::from_secs(2));
        assert_eq!(resolver.init_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(ResolverConfig::default().init_timeout(), None);
    }

    #[test]
    fn test_sub_configs_deserialize_with_defaults() {
        let resolver: ResolverConfig =
            serde_json::from_str(r#"{"allow_quality_downgrade": true}"#).unwrap();
        assert!(resolver.allow_quality_downgrade);
        assert_eq!(resolver.default_quality, "128k");

        let script: ScriptConfig = serde_json::from_str(r#"{"max_operations": 10}"#).unwrap();
        assert_eq!(script.max_operations, 10);
        assert_eq!(script.max_call_levels, 64);

        let tags: TagReaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(tags.chunk_size, DEFAULT_TAG_CHUNK_SIZE);
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("SettingsStore { ... }"));
        assert!(debug.contains("ResolverConfig"));
    }
}
