//! Playback bridge traits and supporting audio types.
//!
//! The core never decodes audio. It drives a host-provided [`AudioOutput`]
//! (AVPlayer, ExoPlayer, a desktop sink) and listens to its push
//! notifications to know when a track has finished.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// High-level audio source descriptor provided to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Local file accessible to the host runtime.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream to be fetched by the host.
    RemoteStream { url: String },
}

impl AudioSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

/// Metadata surfaced to platform media sessions (lock screen, notification).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackMetadata {
    /// Opaque track identifier (`reciter:surah`).
    pub track_id: Option<String>,
    /// Display title for the track.
    pub title: Option<String>,
    /// Reciter display name or id.
    pub artist: Option<String>,
    /// Arbitrary extra fields (e.g., artwork URI).
    pub extra: HashMap<String, String>,
}

/// Playback state as reported by the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Push notification emitted by an [`AudioOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutputEvent {
    /// The loaded track played to its end.
    Finished,
    /// The loaded source could not be played.
    Error { message: String },
    /// The output changed state on its own (e.g. remote control, interruption).
    StateChanged(OutputState),
}

/// Trait for platform audio outputs.
///
/// Volume is normalized to `0.0..=1.0`.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Replace the current source. Playback does not start until `play`.
    async fn load(&self, source: AudioSource, metadata: PlaybackMetadata) -> Result<()>;

    /// Begin or resume playback.
    async fn play(&self) -> Result<()>;

    /// Pause playback without unloading the source.
    async fn pause(&self) -> Result<()>;

    /// Seek to an absolute position within the loaded source.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Adjust playback volume.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Current playback position.
    async fn position(&self) -> Result<Duration>;

    /// Subscribe to push notifications.
    async fn subscribe_events(&self) -> Result<Box<dyn AudioOutputEventStream>>;
}

/// Stream of output notifications
#[async_trait]
pub trait AudioOutputEventStream: Send {
    /// Returns `None` when the output is released.
    async fn next(&mut self) -> Option<AudioOutputEvent>;
}
