//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for streaming file reads and key-value
//! settings storage.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O so mobile hosts can hand over content URIs or
/// sandboxed documents:
/// - Desktop: direct filesystem access
/// - iOS/Android: sandboxed app directories, SAF/document picker
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn file_len(fs: &dyn FileSystemAccess, path: &Path) -> Result<u64> {
///     Ok(fs.metadata(path).await?.size)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Read entire file contents into memory
    ///
    /// For audio files use `open_read_stream` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Read a UTF-8 text file
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let data = self.read_file(path).await?;
        String::from_utf8(data.to_vec()).map_err(|e| {
            crate::error::BridgeError::OperationFailed(format!(
                "File is not valid UTF-8: {}",
                e
            ))
        })
    }

    /// Open a file for streaming reads
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite key-value table
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_plugins(store: &dyn SettingsStore, json: &str) -> Result<()> {
///     store.set_string("source_plugins", json).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    struct FixedFs(&'static [u8]);

    #[async_trait]
    impl FileSystemAccess for FixedFs {
        async fn exists(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }

        async fn metadata(&self, _path: &Path) -> Result<FileMetadata> {
            Ok(FileMetadata {
                size: self.0.len() as u64,
                modified_at: None,
                is_directory: false,
            })
        }

        async fn read_file(&self, _path: &Path) -> Result<Bytes> {
            Ok(Bytes::from_static(self.0))
        }

        async fn open_read_stream(
            &self,
            _path: &Path,
        ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
            Err(BridgeError::NotAvailable("streams".to_string()))
        }
    }

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            modified_at: Some(1234567900),
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }

    #[tokio::test]
    async fn test_read_to_string_default() {
        let fs = FixedFs(b"exports.id = \"local\";");
        let text = fs.read_to_string(Path::new("source.rhai")).await.unwrap();
        assert_eq!(text, "exports.id = \"local\";");

        let binary = FixedFs(&[0xff, 0xfe]);
        assert!(binary.read_to_string(Path::new("x")).await.is_err());
    }
}
