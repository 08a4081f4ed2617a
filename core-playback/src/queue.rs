//! Playback queue
//!
//! Keeps the queue exactly as the caller supplied it next to the active
//! queue that is consumed front to back. Mode switches and offline filtering
//! rebuild the active queue from the original order minus what has already
//! been played, so no switch sequence can lose or duplicate a track.

use bridge_traits::{Track, TrackKey};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    original: Vec<Track>,
    active: VecDeque<Track>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the original order. The active queue is left untouched until
    /// the next [`rebuild`](Self::rebuild).
    pub fn set_original(&mut self, tracks: Vec<Track>) {
        self.original = tracks;
    }

    pub fn original(&self) -> &[Track] {
        &self.original
    }

    /// Tracks of the original order that have not been played yet.
    pub fn unplayed(&self, played: &HashSet<TrackKey>) -> Vec<Track> {
        self.original
            .iter()
            .filter(|t| !played.contains(&t.key))
            .cloned()
            .collect()
    }

    /// Replace the active queue.
    pub fn rebuild(&mut self, tracks: Vec<Track>) {
        self.active = tracks.into();
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.active.pop_front()
    }

    pub fn push_front(&mut self, track: Track) {
        self.active.retain(|t| t.key != track.key);
        self.active.push_front(track);
    }

    pub fn active(&self) -> impl Iterator<Item = &Track> {
        self.active.iter()
    }

    pub fn active_keys(&self) -> Vec<TrackKey> {
        self.active.iter().map(|t| t.key.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn clear(&mut self) {
        self.original.clear();
        self.active.clear();
    }
}
