//! # Source Core
//!
//! Resolves logical track requests to playable URLs through dynamically
//! loaded source plugins.
//!
//! ## Overview
//!
//! - [`SourceRegistry`] holds the loaded plugins and the selected one
//! - [`ScriptHost`] evaluates plugin source text in a sandboxed `rhai` engine
//! - [`InitGate`] holds resolutions until startup loading is done
//! - [`ResolutionEngine`] tries candidates in order with quality checks,
//!   a per-attempt tried-set and rate-limit short-circuiting
//! - [`SourceContext`] wires them together with persistence and import
//!
//! Plugins resolve one track at a time through [`MusicUrlResolver`]. Hosts
//! can register native resolvers next to scripted ones.

pub mod context;
pub mod engine;
pub mod error;
pub mod gate;
pub mod import;
pub mod model;
pub mod plugin;
pub mod registry;
pub mod script;
pub mod store;

pub use context::{BootstrapReport, SourceContext};
pub use engine::{ResolutionAttempt, ResolutionEngine};
pub use error::{Result, SourceError};
pub use gate::{GateState, InitGate, InitGuard};
pub use model::{
    includes_media, is_same_media_item, media_key, MediaKey, MusicUrl, Quality, QualityMap,
    Resolution, Track,
};
pub use plugin::{MusicUrlResolver, PluginEntry, PluginInfo, PluginOrigin, SourcePlugin};
pub use registry::SourceRegistry;
pub use script::{ScriptHost, ScriptResolver};
pub use store::{PluginStore, StoredPlugin};
