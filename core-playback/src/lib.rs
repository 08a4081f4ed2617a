//! # Playback Queue Engine
//!
//! Decides what plays next for the recitation player.
//!
//! ## Overview
//!
//! This module handles:
//! - Sequential, shuffle and repeat ordering over a caller-supplied queue
//! - Skip-and-retry auto-advance with a re-entrancy guard
//! - Offline filtering of the queue to downloaded tracks
//! - A wall-clock sleep timer with fade-out
//! - Session snapshots persisted through the metadata store
//!
//! Audio rendering itself is delegated to the host through
//! [`bridge_traits::AudioOutput`].

pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod history;
pub mod queue;
pub mod session;
pub mod shuffle;
pub mod sleep_timer;
pub mod types;

pub use config::PlaybackConfig;
pub use core_runtime::events::{PlaybackMode, PlaybackStatus};
pub use engine::PlaybackEngine;
pub use error::{PlaybackError, Result};
pub use session::{SessionStore, SESSION_KEY};
pub use sleep_timer::ExpireCallback;
pub use types::{PlayOptions, PlaybackStateSnapshot, SessionSnapshot};
