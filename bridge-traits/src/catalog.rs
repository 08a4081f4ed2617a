//! Track Catalog Abstraction
//!
//! Read-only view over the recitation catalog (reciters, surahs) and the
//! per-track local availability derived from download records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::playback::AudioSource;

/// Number of surahs in the catalog.
pub const SURAH_COUNT: u32 = 114;

/// CDN serving the recitation audio files.
pub const DEFAULT_CDN_BASE_URL: &str = "https://qariee-storage.y3f.me";

/// Typed identifier of a playable unit.
///
/// `collection_id` is the reciter id and `item_id` the surah number. The
/// `Display` form (`reciter:surah`) is only used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub collection_id: String,
    pub item_id: u32,
}

impl TrackKey {
    pub fn new(collection_id: impl Into<String>, item_id: u32) -> Self {
        Self {
            collection_id: collection_id.into(),
            item_id,
        }
    }

    /// Relative storage path of the audio file, e.g. `audio/hussary/001.mp3`.
    pub fn relative_audio_path(&self) -> PathBuf {
        PathBuf::from("audio")
            .join(&self.collection_id)
            .join(format!("{:03}.mp3", self.item_id))
    }

    /// Remote URL of the audio file under the given CDN base URL.
    pub fn remote_url(&self, cdn_base_url: &str) -> String {
        format!(
            "{}/audio/{}/{:03}.mp3",
            cdn_base_url.trim_end_matches('/'),
            self.collection_id,
            self.item_id
        )
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection_id, self.item_id)
    }
}

/// A playable recitation of one surah by one reciter.
///
/// Immutable value object recreated on every catalog read.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub key: TrackKey,
    /// Display name (surah name)
    pub name: String,
    /// Where the audio can be loaded from
    pub source: AudioSource,
    /// Whether `source` points to a verified local file
    pub is_local: bool,
}

impl Track {
    /// Create a track streaming from a remote URL.
    pub fn remote(key: TrackKey, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            source: AudioSource::RemoteStream { url: url.into() },
            is_local: false,
        }
    }

    /// Create a track backed by a downloaded file.
    pub fn local(key: TrackKey, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            name: name.into(),
            source: AudioSource::LocalFile { path: path.into() },
            is_local: true,
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.key.collection_id
    }

    pub fn item_id(&self) -> u32 {
        self.key.item_id
    }
}

/// Reciter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reciter {
    pub id: String,
    pub name_en: String,
    pub name_ar: String,
    pub color_primary: String,
    pub color_secondary: String,
}

/// Surah row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surah {
    pub number: u32,
    pub name_ar: String,
    pub name_en: String,
}

/// Track catalog trait
///
/// Provides all tracks of a collection together with their download status.
/// Implementations must cross-check download records against actual file
/// presence so that `is_locally_available` never reports a ghost record.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::{TrackCatalog, TrackKey};
///
/// async fn offline_tracks(catalog: &dyn TrackCatalog) -> Result<usize> {
///     let tracks = catalog.get_all_tracks_for("hussary").await?;
///     Ok(tracks.iter().filter(|t| t.is_local).count())
/// }
/// ```
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// All tracks of a collection, in catalog order.
    async fn get_all_tracks_for(&self, collection_id: &str) -> Result<Vec<Track>>;

    /// Look up a single track.
    async fn get_track(&self, key: &TrackKey) -> Result<Option<Track>> {
        let tracks = self.get_all_tracks_for(&key.collection_id).await?;
        Ok(tracks.into_iter().find(|t| &t.key == key))
    }

    /// Whether the track has a verified local file.
    async fn is_locally_available(&self, key: &TrackKey) -> Result<bool>;

    /// Absolute path of the local file, if the track is downloaded.
    async fn local_path_for(&self, key: &TrackKey) -> Result<Option<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_key_paths() {
        let key = TrackKey::new("hussary", 2);
        assert_eq!(
            key.relative_audio_path(),
            PathBuf::from("audio").join("hussary").join("002.mp3")
        );
        assert_eq!(
            key.remote_url("https://cdn.example.com/"),
            "https://cdn.example.com/audio/hussary/002.mp3"
        );
        assert_eq!(key.to_string(), "hussary:2");
    }

    #[test]
    fn test_track_constructors() {
        let key = TrackKey::new("minshawi", 114);
        let remote = Track::remote(key.clone(), "An-Nas", "https://x/audio/minshawi/114.mp3");
        assert!(!remote.is_local);
        assert!(remote.source.is_remote());

        let local = Track::local(key, "An-Nas", "/data/audio/minshawi/114.mp3");
        assert!(local.is_local);
        assert_eq!(local.item_id(), 114);
        assert_eq!(local.collection_id(), "minshawi");
    }
}
