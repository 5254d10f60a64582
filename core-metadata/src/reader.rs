//! Tag Reader
//!
//! Entry point that wires a byte source, the chunk loader and the frame
//! decoder together, and turns "no supported tag" into `Ok(None)`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{FieldSelection, TagReader};
//! use core_runtime::config::TagReaderConfig;
//! use std::path::Path;
//!
//! # async fn example() -> core_metadata::Result<()> {
//! let reader = TagReader::new(TagReaderConfig::default())?;
//! if let Some(frames) = reader
//!     .read_file(Path::new("song.mp3"), &FieldSelection::default())
//!     .await?
//! {
//!     println!("Title: {}", frames.title().unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_runtime::config::TagReaderConfig;
use core_runtime::events::{CoreEvent, EventBus, MetadataEvent};
use core_runtime::logging::strip_path;
use std::path::Path;
use tokio::io::AsyncRead;
use tracing::{debug, instrument, warn};

use crate::decoder::FrameDecoder;
use crate::error::{Result, TagError};
use crate::frames::{FieldSelection, TagFrameSet};
use crate::loader::ChunkLoader;

/// Reads ID3v2 frames from files, host streams or in-memory buffers.
#[derive(Debug, Clone)]
pub struct TagReader {
    config: TagReaderConfig,
    event_bus: Option<EventBus>,
}

impl TagReader {
    pub fn new(config: TagReaderConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| TagError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            event_bus: None,
        })
    }

    /// Publishes a `MetadataEvent` for every read.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &TagReaderConfig {
        &self.config
    }

    /// Reads tags from a local file.
    #[instrument(skip(self, path, selection), fields(file = %strip_path(&path.to_string_lossy())))]
    pub async fn read_file(
        &self,
        path: &Path,
        selection: &FieldSelection,
    ) -> Result<Option<TagFrameSet>> {
        let label = strip_path(&path.to_string_lossy()).to_string();
        let opened = async {
            let file = tokio::fs::File::open(path).await?;
            let len = file.metadata().await?.len();
            Ok::<_, TagError>((file, len))
        }
        .await;

        match opened {
            Ok((file, len)) => self.read_labeled(&label, file, Some(len), selection).await,
            Err(e) => Err(self.report_failure(&label, e)),
        }
    }

    /// Reads tags through a host file system bridge.
    #[instrument(skip(self, fs, path, selection), fields(file = %strip_path(&path.to_string_lossy())))]
    pub async fn read_with_fs(
        &self,
        fs: &dyn FileSystemAccess,
        path: &Path,
        selection: &FieldSelection,
    ) -> Result<Option<TagFrameSet>> {
        let label = strip_path(&path.to_string_lossy()).to_string();
        let opened = async {
            let len = fs.metadata(path).await?.size;
            let stream = fs.open_read_stream(path).await?;
            Ok::<_, TagError>((stream, len))
        }
        .await;

        match opened {
            Ok((stream, len)) => self.read_labeled(&label, stream, Some(len), selection).await,
            Err(e) => Err(self.report_failure(&label, e)),
        }
    }

    /// Reads tags from any async reader. `len` bounds the read when known.
    pub async fn read_stream<R>(
        &self,
        reader: R,
        len: Option<u64>,
        selection: &FieldSelection,
    ) -> Result<Option<TagFrameSet>>
    where
        R: AsyncRead + Unpin,
    {
        self.read_labeled("<stream>", reader, len, selection).await
    }

    /// Reads tags from bytes already in memory.
    pub async fn read_bytes(
        &self,
        data: Bytes,
        selection: &FieldSelection,
    ) -> Result<Option<TagFrameSet>> {
        let len = data.len() as u64;
        self.read_labeled("<memory>", std::io::Cursor::new(data), Some(len), selection)
            .await
    }

    async fn read_labeled<R>(
        &self,
        label: &str,
        reader: R,
        len: Option<u64>,
        selection: &FieldSelection,
    ) -> Result<Option<TagFrameSet>>
    where
        R: AsyncRead + Unpin,
    {
        let loader = ChunkLoader::new(reader, len, self.config.chunk_size);

        match FrameDecoder::new(loader, *selection).decode().await {
            Ok(frames) => {
                debug!(file = label, frames = frames.len(), "Read tags");
                self.emit(MetadataEvent::TagsRead {
                    file: label.to_string(),
                    fields: frames.kinds().map(|kind| kind.to_string()).collect(),
                });
                Ok(Some(frames))
            }
            Err(TagError::UnrecognizedFormat(reason)) => {
                debug!(file = label, reason = %reason, "No supported tag");
                self.emit(MetadataEvent::UnrecognizedFormat {
                    file: label.to_string(),
                });
                Ok(None)
            }
            Err(e) => Err(self.report_failure(label, e)),
        }
    }

    fn report_failure(&self, label: &str, error: TagError) -> TagError {
        warn!(file = label, error = %error, "Tag reading failed");
        self.emit(MetadataEvent::TagReadFailed {
            file: label.to_string(),
            message: error.to_string(),
        });
        error
    }

    fn emit(&self, event: MetadataEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Metadata(event)).ok();
        }
    }
}

impl Default for TagReader {
    fn default() -> Self {
        Self {
            config: TagReaderConfig::default(),
            event_bus: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = TagReader::new(TagReaderConfig::with_chunk_size(0)).unwrap_err();
        assert!(matches!(err, TagError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_read_bytes_without_tag() {
        let reader = TagReader::default();
        let result = reader
            .read_bytes(Bytes::from_static(b"fLaC\0\0\0\x22"), &FieldSelection::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let reader = TagReader::default();
        let missing = std::env::temp_dir().join("core-metadata-missing-file.mp3");
        let err = reader
            .read_file(&missing, &FieldSelection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Io(_)));
    }
}
