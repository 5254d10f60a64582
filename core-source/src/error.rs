use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to load plugin from {origin}: {reason}")]
    PluginLoad { origin: String, reason: String },

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin {0} does not export getMusicUrl")]
    ResolverMissing(String),

    #[error("Source {platform} failed to resolve track {track_id}: {reason}")]
    ResolveFailed {
        platform: String,
        track_id: String,
        reason: String,
    },

    #[error("Rate limited by source {platform}: {message}")]
    RateLimited { platform: String, message: String },

    #[error("All sources exhausted (tried: {})", tried.join(", "))]
    AllSourcesExhausted { tried: Vec<String> },

    #[error("Source initialization did not complete: {0}")]
    NotReady(String),

    #[error("Plugin import failed: {0}")]
    ImportFailed(String),

    #[error("Plugin persistence failed: {0}")]
    Persistence(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }

    /// Errors that end a resolution instead of moving on to the next source.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. }
                | SourceError::AllSourcesExhausted { .. }
                | SourceError::NotReady(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
