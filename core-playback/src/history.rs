//! Play history for previous-track navigation

use bridge_traits::{Track, TrackKey};
use std::collections::VecDeque;

/// Tracks that were replaced as current, most recent last.
///
/// Unbounded for the lifetime of a session; reset when a new session starts.
#[derive(Debug, Clone, Default)]
pub struct PlayHistory {
    tracks: VecDeque<Track>,
}

impl PlayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Remove and return the most recently played track.
    pub fn pop(&mut self) -> Option<Track> {
        self.tracks.pop_back()
    }

    /// Most recently played track without removing it.
    pub fn peek(&self) -> Option<&Track> {
        self.tracks.back()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Keys from oldest to most recent.
    pub fn keys(&self) -> Vec<TrackKey> {
        self.tracks.iter().map(|t| t.key.clone()).collect()
    }
}

impl FromIterator<Track> for PlayHistory {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        Self {
            tracks: iter.into_iter().collect(),
        }
    }
}
