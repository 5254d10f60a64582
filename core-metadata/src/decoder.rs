//! ID3v2 Tag Frame Decoder
//!
//! Walks the tag as a three-state machine:
//!
//! ```text
//! Header ──► FrameScan ──► Done
//!               ▲   │
//!               └───┘ (one frame per step)
//! ```
//!
//! Only ID3v2.3 and ID3v2.4 are accepted. Frames the caller did not ask for
//! are skipped without being buffered, and scanning stops as soon as every
//! requested kind has a value.

use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::error::{Result, TagError};
use crate::frames::{FieldSelection, FrameKind, FrameValue, Picture, TagFrameSet};
use crate::loader::ChunkLoader;
use crate::text::decode_text_frame;

const ID3_MAGIC: &[u8; 3] = b"ID3";
const FLAG_EXTENDED_HEADER: u8 = 0x40;

/// Decodes a 28-bit synchsafe integer (7 bits per byte, MSB first).
pub fn synchsafe(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// The fixed ten-byte tag header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub major: u8,
    pub revision: u8,
    pub flags: u8,
    /// Tag size excluding the header itself.
    pub size: u32,
}

impl TagHeader {
    pub const LEN: u64 = 10;

    pub fn has_extended_header(&self) -> bool {
        self.flags & FLAG_EXTENDED_HEADER != 0
    }

    /// Stream offset just past the tag.
    pub fn tag_end(&self) -> u64 {
        Self::LEN + u64::from(self.size)
    }

    /// v2.4 frame sizes are synchsafe, v2.3 sizes are plain big-endian.
    pub fn frame_size(&self, bytes: [u8; 4]) -> u32 {
        if self.major >= 4 {
            synchsafe(bytes)
        } else {
            u32::from_be_bytes(bytes)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Header,
    FrameScan,
    Done,
}

pub struct FrameDecoder<R> {
    loader: ChunkLoader<R>,
    selection: FieldSelection,
    header: Option<TagHeader>,
    frames: TagFrameSet,
    state: DecoderState,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    pub fn new(loader: ChunkLoader<R>, selection: FieldSelection) -> Self {
        Self {
            loader,
            selection,
            header: None,
            frames: TagFrameSet::new(),
            state: DecoderState::Header,
        }
    }

    /// Runs the state machine to completion.
    ///
    /// Fails with `UnrecognizedFormat` when the header is missing or names an
    /// unsupported version, and with `OutOfRange` when a requested frame's
    /// payload runs past the end of the tag.
    pub async fn decode(mut self) -> Result<TagFrameSet> {
        loop {
            self.state = match self.state {
                DecoderState::Header => self.read_header().await?,
                DecoderState::FrameScan => self.scan_frame().await?,
                DecoderState::Done => return Ok(self.frames),
            };
        }
    }

    pub fn header(&self) -> Option<&TagHeader> {
        self.header.as_ref()
    }

    async fn read_header(&mut self) -> Result<DecoderState> {
        let magic = self
            .loader
            .read_array::<3>()
            .await
            .map_err(unrecognized_if_short)?;
        if &magic != ID3_MAGIC {
            return Err(TagError::UnrecognizedFormat(
                "missing ID3 magic".to_string(),
            ));
        }

        let [major, revision, flags] = self
            .loader
            .read_array::<3>()
            .await
            .map_err(unrecognized_if_short)?;
        if !matches!(major, 3 | 4) {
            return Err(TagError::UnrecognizedFormat(format!(
                "unsupported ID3v2.{} tag",
                major
            )));
        }

        let size_bytes = self
            .loader
            .read_array::<4>()
            .await
            .map_err(unrecognized_if_short)?;

        let header = TagHeader {
            major,
            revision,
            flags,
            size: synchsafe(size_bytes),
        };
        self.loader.narrow_end(header.tag_end());
        debug!(
            version = %format!("2.{}.{}", major, revision),
            size = header.size,
            "Parsed tag header"
        );

        if header.has_extended_header() {
            self.skip_extended_header(&header).await?;
        }
        self.header = Some(header);

        if self.selection.is_empty() {
            return Ok(DecoderState::Done);
        }
        Ok(DecoderState::FrameScan)
    }

    async fn skip_extended_header(&mut self, header: &TagHeader) -> Result<()> {
        let size_bytes = self.loader.read_array::<4>().await?;
        // v2.3 counts the bytes after the size field, v2.4 counts the whole block.
        let body = if header.major >= 4 {
            u64::from(synchsafe(size_bytes)).saturating_sub(4)
        } else {
            u64::from(u32::from_be_bytes(size_bytes))
        };

        let skipped = self.loader.skip(body).await?;
        if skipped < body {
            return Err(TagError::OutOfRange {
                offset: self.loader.position(),
                needed: body - skipped,
            });
        }
        trace!(bytes = body, "Skipped extended header");
        Ok(())
    }

    async fn scan_frame(&mut self) -> Result<DecoderState> {
        let Some(header) = self.header else {
            return Ok(DecoderState::Header);
        };

        // Fewer than ten bytes cannot hold a frame header; treat as padding.
        if self.loader.remaining() < 10 {
            return Ok(DecoderState::Done);
        }

        let frame_header = match self.loader.read_array::<10>().await {
            Ok(bytes) => bytes,
            Err(TagError::OutOfRange { .. }) => return Ok(DecoderState::Done),
            Err(e) => return Err(e),
        };

        if frame_header[0] == 0 {
            trace!(offset = self.loader.position(), "Reached padding");
            return Ok(DecoderState::Done);
        }

        let id = [
            frame_header[0],
            frame_header[1],
            frame_header[2],
            frame_header[3],
        ];
        let size = header.frame_size([
            frame_header[4],
            frame_header[5],
            frame_header[6],
            frame_header[7],
        ]);

        let wanted = FrameKind::from_frame_id(&id)
            .filter(|kind| self.selection.requests(*kind) && !self.frames.contains(*kind));

        match wanted {
            Some(kind) => {
                let payload = self.loader.read_bytes(size as usize).await?;
                self.store(kind, &payload);
            }
            None => {
                let skipped = self.loader.skip(u64::from(size)).await?;
                trace!(
                    frame = %String::from_utf8_lossy(&id),
                    size,
                    skipped,
                    "Skipped frame"
                );
                if skipped < u64::from(size) {
                    return Ok(DecoderState::Done);
                }
            }
        }

        if self.frames.len() == self.selection.requested_count() {
            return Ok(DecoderState::Done);
        }
        Ok(DecoderState::FrameScan)
    }

    fn store(&mut self, kind: FrameKind, payload: &[u8]) {
        let value = if kind.is_text() {
            let text = decode_text_frame(payload);
            if text.is_empty() {
                debug!(frame = kind.frame_id(), "Ignoring empty text frame");
                return;
            }
            FrameValue::Text(text)
        } else {
            match Picture::parse(payload) {
                Some(picture) => FrameValue::Picture(picture),
                None => {
                    debug!(frame = kind.frame_id(), "Ignoring malformed picture frame");
                    return;
                }
            }
        };

        debug!(frame = kind.frame_id(), "Decoded frame");
        self.frames.insert_first(kind, value);
    }
}

fn unrecognized_if_short(error: TagError) -> TagError {
    match error {
        TagError::OutOfRange { .. } => {
            TagError::UnrecognizedFormat("data shorter than a tag header".to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(data: &[u8], selection: FieldSelection) -> Result<TagFrameSet> {
        let loader = ChunkLoader::new(data, Some(data.len() as u64), 7);
        FrameDecoder::new(loader, selection).decode().await
    }

    fn tag(major: u8, flags: u8, body: &[u8]) -> Vec<u8> {
        let size = body.len() as u32;
        let mut out = b"ID3".to_vec();
        out.extend_from_slice(&[major, 0, flags]);
        out.extend_from_slice(&[
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        out.extend_from_slice(body);
        out
    }

    fn frame(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_synchsafe() {
        assert_eq!(synchsafe([0, 0, 0, 0x7F]), 127);
        assert_eq!(synchsafe([0, 0, 1, 0]), 128);
        assert_eq!(synchsafe([0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
    }

    #[test]
    fn test_frame_size_by_version() {
        let v3 = TagHeader { major: 3, revision: 0, flags: 0, size: 0 };
        let v4 = TagHeader { major: 4, ..v3 };
        assert_eq!(v3.frame_size([0, 0, 1, 0]), 256);
        assert_eq!(v4.frame_size([0, 0, 1, 0]), 128);
    }

    #[tokio::test]
    async fn test_bad_magic_is_unrecognized() {
        let err = decode(b"RIFF0000000000", FieldSelection::default())
            .await
            .unwrap_err();
        assert!(err.is_unrecognized());

        let err = decode(b"ID", FieldSelection::default()).await.unwrap_err();
        assert!(err.is_unrecognized());
    }

    #[tokio::test]
    async fn test_unsupported_major_is_unrecognized() {
        let data = tag(2, 0, &frame(b"TIT2", b"\x00Old"));
        let err = decode(&data, FieldSelection::default()).await.unwrap_err();
        assert!(err.is_unrecognized());
    }

    #[tokio::test]
    async fn test_extended_header_is_skipped() {
        let mut body = vec![0, 0, 0, 6, 0, 0, 0, 0, 0, 0];
        body.extend(frame(b"TIT2", b"\x00After"));
        let data = tag(3, FLAG_EXTENDED_HEADER, &body);

        let frames = decode(&data, FieldSelection::only(&[FrameKind::Title]))
            .await
            .unwrap();
        assert_eq!(frames.title(), Some("After"));
    }

    #[tokio::test]
    async fn test_v4_synchsafe_frame_size() {
        let payload = vec![b'a'; 200];
        let mut text = vec![0x00];
        text.extend_from_slice(&payload);

        let mut body = b"TIT2".to_vec();
        let size = text.len() as u32;
        body.extend_from_slice(&[0, 0, ((size >> 7) & 0x7F) as u8, (size & 0x7F) as u8]);
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&text);
        body.extend(frame(b"TPE1", b"\x00Artist"));
        let data = tag(4, 0, &body);

        let frames = decode(&data, FieldSelection::default()).await.unwrap();
        assert_eq!(frames.title().map(str::len), Some(200));
        assert_eq!(frames.artist(), Some("Artist"));
    }

    #[tokio::test]
    async fn test_nothing_requested_stops_after_header() {
        let data = tag(3, 0, &frame(b"TIT2", b"\x00Song"));
        let frames = decode(&data, FieldSelection::none()).await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_padding_ends_scan() {
        let mut body = frame(b"TIT2", b"\x00Song");
        body.extend_from_slice(&[0u8; 32]);
        body.extend(frame(b"TPE1", b"\x00Hidden"));
        let data = tag(3, 0, &body);

        let frames = decode(&data, FieldSelection::default()).await.unwrap();
        assert_eq!(frames.title(), Some("Song"));
        assert_eq!(frames.artist(), None);
    }

    #[tokio::test]
    async fn test_short_skip_ends_scan() {
        let mut body = frame(b"TIT2", b"\x00Song");
        // Declares 1000 bytes but the tag ends after 3
        body.extend_from_slice(b"TXXX");
        body.extend_from_slice(&1000u32.to_be_bytes());
        body.extend_from_slice(&[0, 0, 1, 2, 3]);
        let data = tag(3, 0, &body);

        let frames = decode(&data, FieldSelection::default()).await.unwrap();
        assert_eq!(frames.title(), Some("Song"));
    }

    #[tokio::test]
    async fn test_truncated_requested_payload_is_out_of_range() {
        let mut body = b"TIT2".to_vec();
        body.extend_from_slice(&50u32.to_be_bytes());
        body.extend_from_slice(&[0, 0, 0x00, b'S', b'o']);
        let data = tag(3, 0, &body);

        let err = decode(&data, FieldSelection::default()).await.unwrap_err();
        assert!(matches!(err, TagError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_empty_text_frame_not_stored() {
        let mut body = frame(b"TIT2", b"\x00\x00");
        body.extend(frame(b"TIT2", b"\x00Second"));
        let data = tag(3, 0, &body);

        let frames = decode(&data, FieldSelection::only(&[FrameKind::Title]))
            .await
            .unwrap();
        assert_eq!(frames.title(), Some("Second"));
    }
}
