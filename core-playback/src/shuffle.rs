//! Shuffle ordering with recent-track avoidance
//!
//! Shuffle draws a uniformly random order (Fisher-Yates) over the remaining
//! tracks, leaving out the most recently played ones. When every candidate
//! is recent the history is cleared so the queue never comes out empty.

use bridge_traits::{Track, TrackKey};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::collections::VecDeque;

/// Bounded list of recently played track keys, oldest first.
#[derive(Debug, Clone)]
pub struct ShuffleHistory {
    entries: VecDeque<TrackKey>,
    capacity: usize,
}

impl ShuffleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a played track.
    ///
    /// A key already present is moved to the newest slot. The oldest key is
    /// evicted once the history is full.
    pub fn push(&mut self, key: TrackKey) {
        if self.capacity == 0 {
            return;
        }

        self.entries.retain(|k| k != &key);
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(key);
    }

    /// Forget a key (used when stepping back to a track).
    pub fn remove(&mut self, key: &TrackKey) {
        self.entries.retain(|k| k != key);
    }

    pub fn contains(&self, key: &TrackKey) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> Vec<TrackKey> {
        self.entries.iter().cloned().collect()
    }
}

/// Shuffle `candidates`, excluding tracks present in `history`.
///
/// Clears `history` when the exclusion would leave nothing to play.
pub fn shuffle_with_history(candidates: Vec<Track>, history: &mut ShuffleHistory) -> Vec<Track> {
    shuffle_with_history_rng(candidates, history, &mut thread_rng())
}

/// [`shuffle_with_history`] with an explicit random source.
pub fn shuffle_with_history_rng<R: Rng + ?Sized>(
    candidates: Vec<Track>,
    history: &mut ShuffleHistory,
    rng: &mut R,
) -> Vec<Track> {
    let (fresh, recent): (Vec<Track>, Vec<Track>) = candidates
        .into_iter()
        .partition(|track| !history.contains(&track.key));

    let mut pool = if fresh.is_empty() {
        history.clear();
        recent
    } else {
        fresh
    };
    pool.shuffle(rng);
    pool
}
