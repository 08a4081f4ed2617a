//! # Playback Error Types
//!
//! Error types for the playback queue engine and session persistence.

use bridge_traits::{BridgeError, TrackKey};
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// No audio output has been attached to the engine.
    #[error("Playback output not initialized")]
    NotInitialized,

    /// Configuration values are out of range.
    #[error("Invalid playback configuration: {0}")]
    InvalidConfig(String),

    /// Caller supplied an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Track cannot be resolved or the output refused to load it.
    #[error("Audio source unavailable: {0}")]
    SourceUnavailable(String),

    /// Explicit request to stream a non-downloaded track while offline.
    #[error("{key} requires an internet connection; download it to listen offline")]
    OfflineViolation { key: TrackKey },

    /// Auto-advance gave up after skipping unplayable tracks.
    #[error("Could not advance playback after {attempts} attempts")]
    AdvanceExhausted { attempts: u32 },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Session snapshot could not be encoded or decoded.
    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bridge call failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    /// Returns `true` if auto-advance should skip to the next entry.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PlaybackError::SourceUnavailable(_)
                | PlaybackError::OfflineViolation { .. }
                | PlaybackError::Bridge(_)
        )
    }

    /// Returns `true` if a saved session that failed this way can never be
    /// restored and should be discarded.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            PlaybackError::SourceUnavailable(_) | PlaybackError::OfflineViolation { .. }
        )
    }

    /// Returns `true` if this error is due to missing connectivity.
    pub fn is_offline(&self) -> bool {
        matches!(self, PlaybackError::OfflineViolation { .. })
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_message_is_user_facing() {
        let err = PlaybackError::OfflineViolation {
            key: TrackKey::new("hussary", 18),
        };
        assert!(err.to_string().contains("requires an internet connection"));
        assert!(err.is_offline());
        assert!(err.is_skippable());
    }

    #[test]
    fn exhausted_is_terminal() {
        let err = PlaybackError::AdvanceExhausted { attempts: 5 };
        assert!(!err.is_skippable());
        assert!(!PlaybackError::NotInitialized.is_skippable());
    }

    #[test]
    fn only_unplayable_sessions_are_discarded() {
        assert!(PlaybackError::SourceUnavailable("gone".into()).invalidates_session());
        assert!(PlaybackError::OfflineViolation {
            key: TrackKey::new("hussary", 1)
        }
        .invalidates_session());
        assert!(!PlaybackError::NotInitialized.invalidates_session());
        assert!(!PlaybackError::Bridge(BridgeError::OperationFailed("locked".into()))
            .invalidates_session());
    }
}
