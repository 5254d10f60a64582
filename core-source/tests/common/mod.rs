#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::{FileMetadata, FileSystemAccess, SettingsStore};
use bytes::Bytes;
use core_runtime::config::{CoreConfig, ResolverConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self.values.lock().get(key).map(|v| v == "true"))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.values.lock().contains_key(key))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

/// Serves fixed bodies by URL; unknown URLs are 404.
#[derive(Default)]
pub struct ScriptServer {
    scripts: HashMap<String, String>,
}

impl ScriptServer {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.scripts.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl HttpClient for ScriptServer {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let (status, body) = match self.scripts.get(&request.url) {
            Some(body) => (200, Bytes::from(body.clone())),
            None => (404, Bytes::new()),
        };
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body,
        })
    }
}

/// Files keyed by path.
#[derive(Default)]
pub struct MemoryFiles {
    files: HashMap<PathBuf, String>,
}

impl MemoryFiles {
    pub fn with(mut self, path: &str, body: &str) -> Self {
        self.files.insert(PathBuf::from(path), body.to_string());
        self
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFiles {
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        let body = self.files.get(path).ok_or_else(|| {
            BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))
        })?;
        Ok(FileMetadata {
            size: body.len() as u64,
            modified_at: None,
            is_directory: false,
        })
    }

    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.files
            .get(path)
            .map(|body| Bytes::from(body.clone()))
            .ok_or_else(|| {
                BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
    }

    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let data = self.read_file(path).await?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }
}

pub fn config(
    settings: Arc<MemorySettings>,
    http: ScriptServer,
    files: MemoryFiles,
    resolver: ResolverConfig,
) -> CoreConfig {
    CoreConfig::builder()
        .data_dir("/app-data")
        .settings_store(settings)
        .http_client(Arc::new(http))
        .file_system(Arc::new(files))
        .resolver(resolver)
        .build()
        .unwrap()
}

/// A plugin whose `getMusicUrl` answers `https://<id>.example.com/<track>`.
pub fn echo_plugin(id: &str) -> String {
    format!(
        r#"
        exports.id = "{id}";
        exports.name = "{id} source";
        exports.getMusicUrl = |track, quality| {{
            #{{ url: "https://{id}.example.com/" + track.id, "type": quality }}
        }};
        "#
    )
}

/// A plugin whose `getMusicUrl` always throws `message`.
pub fn throwing_plugin(id: &str, message: &str) -> String {
    format!(
        r#"
        exports.id = "{id}";
        exports.getMusicUrl = |track, quality| {{
            throw "{message}";
        }};
        "#
    )
}
