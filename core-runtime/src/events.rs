//! # Event Bus System
//!
//! Provides an event-driven architecture for the recitation player core using
//! `tokio::sync::broadcast`. The playback engine and the download manager
//! publish typed events; the UI layer and the session autosave consume them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   emit    ┌───────────┐
//! │ PlaybackEngine  ├──────────>│           │   subscribe   ┌──────────────┐
//! └─────────────────┘           │ EventBus  ├──────────────>│ UI / host    │
//!                               │ (broadcast│               └──────────────┘
//! ┌─────────────────┐   emit    │  channel) │   subscribe   ┌──────────────┐
//! │ DownloadManager ├──────────>│           ├──────────────>│ SessionStore │
//! └─────────────────┘           └───────────┘               └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//! use bridge_traits::TrackKey;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Download(DownloadEvent::Queued {
//!         key: TrackKey::new("hussary", 1),
//!     }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Download(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use bridge_traits::TrackKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback-related events
    Playback(PlaybackEvent),
    /// Download-related events
    Download(DownloadEvent),
}

// ============================================================================
// Playback Vocabulary
// ============================================================================

/// How the next track is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Play the queue in its original order
    #[default]
    Sequential,
    /// Play the queue in random order, avoiding recently played tracks
    Shuffle,
    /// Loop the current track
    Repeat,
}

/// Lifecycle of the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Finished,
    Failed,
}

impl PlaybackStatus {
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events emitted by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Emitted on every transition of the current track, queue or status.
    StateChanged {
        /// Track currently loaded, if any.
        current: Option<TrackKey>,
        /// Upcoming tracks in the order they will be consumed.
        queue: Vec<TrackKey>,
        status: PlaybackStatus,
        mode: PlaybackMode,
    },
    /// A track was loaded and started.
    TrackStarted {
        key: TrackKey,
        /// Whether the track plays from a local file.
        is_local: bool,
    },
    /// The queue ran out in Sequential or Shuffle mode.
    QueueEnded {
        /// The track that finished last.
        last: Option<TrackKey>,
    },
    /// Playback mode changed.
    ModeChanged { mode: PlaybackMode },
    /// Offline status flipped.
    OfflineChanged { offline: bool },
    /// A sleep timer was armed.
    SleepTimerSet {
        /// Absolute deadline (Unix epoch milliseconds).
        ends_at_ms: i64,
    },
    /// A sleep timer fired and playback was paused.
    SleepTimerExpired,
    /// A sleep timer was cancelled.
    SleepTimerCleared,
    /// Playback error occurred.
    Error {
        /// The track involved, if any.
        key: Option<TrackKey>,
        /// Human-readable error message.
        message: String,
        /// Whether playback can be retried.
        recoverable: bool,
    },
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the download manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// Download accepted, either started or waiting for a slot.
    Queued { key: TrackKey },
    /// Incremental progress update.
    Progress {
        key: TrackKey,
        /// Progress percentage (0-100).
        percent: u8,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// Transfer finished and the record was persisted.
    Completed {
        key: TrackKey,
        /// Path relative to the data directory.
        local_path: String,
        total_bytes: u64,
    },
    /// Transfer failed after all retries.
    Failed {
        key: TrackKey,
        /// Human-readable error message.
        message: String,
    },
    /// Download cancelled by the user.
    Cancelled { key: TrackKey },
    /// Downloaded file and record removed.
    Deleted { key: TrackKey },
}

impl DownloadEvent {
    /// Key of the track this event refers to.
    pub fn key(&self) -> &TrackKey {
        match self {
            DownloadEvent::Queued { key }
            | DownloadEvent::Progress { key, .. }
            | DownloadEvent::Completed { key, .. }
            | DownloadEvent::Failed { key, .. }
            | DownloadEvent::Cancelled { key }
            | DownloadEvent::Deleted { key } => key,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let playback_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Playback(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
