//! CyMusic core facade.
//!
//! Re-exports the workspace crates behind feature flags so host applications
//! can depend on `cymusic-core` alone:
//!
//! - `metadata` exposes [`core_metadata`] (ID3 tag reading)
//! - `sources` exposes [`core_source`] (plugin registry and URL resolution)
//! - `desktop-shims` injects desktop bridge defaults into [`core_runtime::config`]

pub use core_runtime;

#[cfg(feature = "metadata")]
pub use core_metadata;

#[cfg(feature = "sources")]
pub use core_source;
