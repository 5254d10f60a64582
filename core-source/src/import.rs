//! Fetching plugin source text from URLs and files.

use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, SourceError};

#[derive(Clone, Default)]
pub struct PluginImporter {
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
}

impl PluginImporter {
    pub fn new(
        http_client: Option<Arc<dyn HttpClient>>,
        file_system: Option<Arc<dyn FileSystemAccess>>,
    ) -> Self {
        Self {
            http_client,
            file_system,
        }
    }

    /// Downloads plugin source text. Non-2xx responses are import failures.
    #[instrument(skip(self))]
    pub async fn fetch_url(&self, url: &str) -> Result<String> {
        if url.trim().is_empty() {
            return Err(SourceError::ImportFailed("URL cannot be empty".to_string()));
        }

        let client = self.http_client.as_ref().ok_or_else(|| {
            SourceError::ImportFailed("no HTTP client configured".to_string())
        })?;

        let response = client.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(SourceError::ImportFailed(format!(
                "HTTP error! status: {}",
                response.status
            )));
        }

        let text = response.text()?;
        debug!(bytes = text.len(), "Fetched plugin source");
        Ok(text)
    }

    pub async fn read_file(&self, path: &Path) -> Result<String> {
        let fs = self.file_system.as_ref().ok_or_else(|| {
            SourceError::ImportFailed("no file system access configured".to_string())
        })?;

        let text = fs.read_to_string(path).await?;
        debug!(bytes = text.len(), "Read plugin source file");
        Ok(text)
    }
}
