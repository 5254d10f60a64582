//! Track and quality model shared by the registry and the resolution engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Audio quality tiers, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Quality {
    #[default]
    #[serde(rename = "128k")]
    Standard,
    #[serde(rename = "320k")]
    High,
    #[serde(rename = "flac")]
    Lossless,
    #[serde(rename = "flac24bit")]
    HiRes,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Standard,
        Quality::High,
        Quality::Lossless,
        Quality::HiRes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Standard => "128k",
            Quality::High => "320k",
            Quality::Lossless => "flac",
            Quality::HiRes => "flac24bit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == name)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown quality: {0}")]
pub struct UnknownQuality(pub String);

impl FromStr for Quality {
    type Err = UnknownQuality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownQuality(s.to_string()))
    }
}

/// Per-source availability of each quality tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityMap(BTreeMap<Quality, bool>);

impl QualityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, quality: Quality, available: bool) {
        self.0.insert(quality, available);
    }

    /// True only when the source explicitly lists the quality as available.
    pub fn supports(&self, quality: Quality) -> bool {
        self.0.get(&quality).copied().unwrap_or(false)
    }

    /// Highest available quality not above `ceiling`.
    pub fn best_at_or_below(&self, ceiling: Quality) -> Option<Quality> {
        self.0
            .range(..=ceiling)
            .rev()
            .find(|(_, available)| **available)
            .map(|(quality, _)| *quality)
    }

    pub fn available(&self) -> impl Iterator<Item = Quality> + '_ {
        self.0
            .iter()
            .filter(|(_, available)| **available)
            .map(|(quality, _)| *quality)
    }
}

impl FromIterator<Quality> for QualityMap {
    fn from_iter<I: IntoIterator<Item = Quality>>(iter: I) -> Self {
        Self(iter.into_iter().map(|q| (q, true)).collect())
    }
}

/// One source-specific variant of a song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Id of the source plugin able to serve this variant.
    pub platform: String,
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artwork: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub qualities: QualityMap,
}

impl Track {
    pub fn new(platform: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.qualities.set(quality, true);
        self
    }

    pub fn media_key(&self) -> String {
        media_key(&self.platform, &self.id)
    }
}

/// URL returned by a plugin together with the quality it actually serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicUrl {
    pub url: String,
    pub quality: Quality,
}

/// Successful outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub source_track: Track,
    pub actual_quality: Quality,
}

pub fn media_key(platform: &str, id: &str) -> String {
    format!("{}@{}", platform, id)
}

/// `platform` + `id` pair identifying a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    pub platform: String,
    pub id: String,
}

impl MediaKey {
    /// Parses `platform@id`, a JSON string holding `platform@id`, or a JSON
    /// object with `platform` and `id` fields.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();

        let (platform, id) = match serde_json::from_str::<serde_json::Value>(key) {
            Ok(serde_json::Value::String(s)) => split_key(&s)?,
            Ok(serde_json::Value::Object(map)) => {
                let field = |name: &str| match map.get(name)? {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                (field("platform")?, field("id")?)
            }
            Ok(_) => return None,
            Err(_) => split_key(key)?,
        };

        if platform.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self { platform, id })
    }

    pub fn matches(&self, track: &Track) -> bool {
        self.platform == track.platform && self.id == track.id
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.platform, self.id)
    }
}

fn split_key(key: &str) -> Option<(String, String)> {
    key.split_once('@')
        .map(|(platform, id)| (platform.to_string(), id.to_string()))
}

pub fn is_same_media_item(a: &Track, b: &Track) -> bool {
    a.platform == b.platform && a.id == b.id
}

pub fn includes_media(list: &[Track], item: &Track) -> bool {
    list.iter().any(|t| is_same_media_item(t, item))
}
