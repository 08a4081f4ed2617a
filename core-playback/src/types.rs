//! Value types exchanged with engine callers.

use bridge_traits::{Track, TrackKey};
use chrono::{DateTime, Utc};
use core_runtime::events::{PlaybackMode, PlaybackStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for [`PlaybackEngine::play`](crate::PlaybackEngine::play).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayOptions {
    /// Keep played ids and histories from the running session.
    pub continue_session: bool,
    /// Seek here before starting.
    pub start_position: Option<Duration>,
    /// Load the track without starting it.
    pub start_paused: bool,
}

impl PlayOptions {
    pub fn continue_session(mut self) -> Self {
        self.continue_session = true;
        self
    }

    pub fn start_at(mut self, position: Duration) -> Self {
        self.start_position = Some(position);
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStateSnapshot {
    pub current: Option<Track>,
    /// Upcoming tracks in consumption order.
    pub queue: Vec<Track>,
    pub mode: PlaybackMode,
    pub status: PlaybackStatus,
    pub offline: bool,
    /// Recently played keys under shuffle, oldest first.
    pub shuffle_history: Vec<TrackKey>,
    pub play_history_len: usize,
    pub sleep_timer_remaining: Option<Duration>,
}

impl PlaybackStateSnapshot {
    pub fn current_key(&self) -> Option<&TrackKey> {
        self.current.as_ref().map(|t| &t.key)
    }

    pub fn queue_keys(&self) -> Vec<TrackKey> {
        self.queue.iter().map(|t| t.key.clone()).collect()
    }
}

/// Persisted playback session.
///
/// Stores keys only; tracks are re-resolved through the catalog on restore
/// so local availability is always current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current: Option<TrackKey>,
    pub position_ms: u64,
    pub mode: PlaybackMode,
    /// Queue in its original order.
    pub queue: Vec<TrackKey>,
    /// Previously played keys, oldest first.
    pub play_history: Vec<TrackKey>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_ms)
    }
}
