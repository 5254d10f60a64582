//! Frame kinds, decoded values and field selection.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::text::TextEncoding;

/// The frames this reader knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Title,
    Artist,
    Album,
    Genre,
    Picture,
}

impl FrameKind {
    pub const ALL: [FrameKind; 5] = [
        FrameKind::Title,
        FrameKind::Artist,
        FrameKind::Album,
        FrameKind::Genre,
        FrameKind::Picture,
    ];

    /// Maps a four-byte ID3v2.3/2.4 frame id to a kind.
    pub fn from_frame_id(id: &[u8; 4]) -> Option<Self> {
        match id {
            b"TIT2" => Some(FrameKind::Title),
            b"TPE1" => Some(FrameKind::Artist),
            b"TALB" => Some(FrameKind::Album),
            b"TCON" => Some(FrameKind::Genre),
            b"APIC" => Some(FrameKind::Picture),
            _ => None,
        }
    }

    pub fn frame_id(&self) -> &'static str {
        match self {
            FrameKind::Title => "TIT2",
            FrameKind::Artist => "TPE1",
            FrameKind::Album => "TALB",
            FrameKind::Genre => "TCON",
            FrameKind::Picture => "APIC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Title => "title",
            FrameKind::Artist => "artist",
            FrameKind::Album => "album",
            FrameKind::Genre => "genre",
            FrameKind::Picture => "picture",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, FrameKind::Picture)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attached picture from an `APIC` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub mime_type: String,
    /// ID3 picture type byte (3 = front cover).
    pub picture_type: u8,
    pub description: String,
    pub data: Bytes,
}

impl Picture {
    /// Parses an `APIC` payload:
    /// encoding, MIME type (Latin-1, NUL-terminated), picture type,
    /// description (NUL-terminated in the frame encoding), image bytes.
    ///
    /// Returns `None` when a terminator is missing.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let (&encoding, rest) = payload.split_first()?;
        let encoding = TextEncoding::from_byte(encoding);

        let mime_end = rest.iter().position(|&b| b == 0)?;
        let mime_type = TextEncoding::Latin1.decode(&rest[..mime_end]);
        let rest = &rest[mime_end + 1..];

        let (&picture_type, rest) = rest.split_first()?;

        let description_end = find_terminator(rest, encoding.terminator_len())?;
        let description = encoding.decode(&rest[..description_end]);
        let data = &rest[description_end + encoding.terminator_len()..];

        Some(Self {
            mime_type: if mime_type.is_empty() {
                "image/".to_string()
            } else {
                mime_type
            },
            picture_type,
            description,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Encodes the image as a `data:` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

fn find_terminator(bytes: &[u8], width: usize) -> Option<usize> {
    if width == 1 {
        return bytes.iter().position(|&b| b == 0);
    }
    bytes
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|index| index * 2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameValue {
    Text(String),
    Picture(Picture),
}

impl FrameValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FrameValue::Text(text) => Some(text),
            FrameValue::Picture(_) => None,
        }
    }

    pub fn as_picture(&self) -> Option<&Picture> {
        match self {
            FrameValue::Picture(picture) => Some(picture),
            FrameValue::Text(_) => None,
        }
    }
}

/// Decoded frames from one parse. Holds at most one value per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFrameSet {
    frames: BTreeMap<FrameKind, FrameValue>,
}

impl TagFrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` unless the kind already has one. Returns whether it was stored.
    pub(crate) fn insert_first(&mut self, kind: FrameKind, value: FrameValue) -> bool {
        if self.frames.contains_key(&kind) {
            return false;
        }
        self.frames.insert(kind, value);
        true
    }

    pub fn get(&self, kind: FrameKind) -> Option<&FrameValue> {
        self.frames.get(&kind)
    }

    pub fn contains(&self, kind: FrameKind) -> bool {
        self.frames.contains_key(&kind)
    }

    pub fn title(&self) -> Option<&str> {
        self.get(FrameKind::Title).and_then(FrameValue::as_text)
    }

    pub fn artist(&self) -> Option<&str> {
        self.get(FrameKind::Artist).and_then(FrameValue::as_text)
    }

    pub fn album(&self) -> Option<&str> {
        self.get(FrameKind::Album).and_then(FrameValue::as_text)
    }

    pub fn genre(&self) -> Option<&str> {
        self.get(FrameKind::Genre).and_then(FrameValue::as_text)
    }

    pub fn picture(&self) -> Option<&Picture> {
        self.get(FrameKind::Picture).and_then(FrameValue::as_picture)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FrameKind> + '_ {
        self.frames.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// Which frames a caller wants.
///
/// Defaults to title, artist and album. Missing JSON fields take the
/// same defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    #[serde(default = "default_true")]
    pub title: bool,
    #[serde(default = "default_true")]
    pub artist: bool,
    #[serde(default = "default_true")]
    pub album: bool,
    #[serde(default)]
    pub genre: bool,
    #[serde(default)]
    pub picture: bool,
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self {
            title: true,
            artist: true,
            album: true,
            genre: false,
            picture: false,
        }
    }
}

impl FieldSelection {
    pub fn all() -> Self {
        Self {
            title: true,
            artist: true,
            album: true,
            genre: true,
            picture: true,
        }
    }

    pub fn none() -> Self {
        Self {
            title: false,
            artist: false,
            album: false,
            genre: false,
            picture: false,
        }
    }

    /// Selection holding exactly the given kinds.
    pub fn only(kinds: &[FrameKind]) -> Self {
        let mut selection = Self::none();
        for kind in kinds {
            selection.set(*kind, true);
        }
        selection
    }

    pub fn set(&mut self, kind: FrameKind, wanted: bool) {
        match kind {
            FrameKind::Title => self.title = wanted,
            FrameKind::Artist => self.artist = wanted,
            FrameKind::Album => self.album = wanted,
            FrameKind::Genre => self.genre = wanted,
            FrameKind::Picture => self.picture = wanted,
        }
    }

    pub fn requests(&self, kind: FrameKind) -> bool {
        match kind {
            FrameKind::Title => self.title,
            FrameKind::Artist => self.artist,
            FrameKind::Album => self.album,
            FrameKind::Genre => self.genre,
            FrameKind::Picture => self.picture,
        }
    }

    pub fn requested_count(&self) -> usize {
        FrameKind::ALL.iter().filter(|k| self.requests(**k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.requested_count() == 0
    }
}
