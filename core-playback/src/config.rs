//! # Playback Configuration
//!
//! Tuning knobs for the queue engine, sleep timer and session persistence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PlaybackError, Result};

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Queue entries auto-advance may try before giving up.
    ///
    /// Default: 5.
    #[serde(default = "default_max_skip_attempts")]
    pub max_skip_attempts: u32,

    /// Age after which an in-flight advance flag is considered stale.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_advance_guard_timeout")]
    pub advance_guard_timeout: Duration,

    /// Number of recent tracks shuffle avoids repeating.
    ///
    /// Default: 5.
    #[serde(default = "default_shuffle_history_size")]
    pub shuffle_history_size: usize,

    /// Length of the volume ramp before the sleep timer pauses playback.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_fade_duration")]
    pub fade_duration: Duration,

    /// Number of discrete volume steps in the fade.
    ///
    /// Default: 20.
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,

    /// Interval at which the session is saved while playing.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: Duration,

    /// Saved sessions older than this are discarded.
    ///
    /// Default: 7 days.
    #[serde(default = "default_session_max_age")]
    pub session_max_age: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_skip_attempts: default_max_skip_attempts(),
            advance_guard_timeout: default_advance_guard_timeout(),
            shuffle_history_size: default_shuffle_history_size(),
            fade_duration: default_fade_duration(),
            fade_steps: default_fade_steps(),
            autosave_interval: default_autosave_interval(),
            session_max_age: default_session_max_age(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_max_skip_attempts(mut self, attempts: u32) -> Self {
        self.max_skip_attempts = attempts;
        self
    }

    pub fn with_advance_guard_timeout(mut self, timeout: Duration) -> Self {
        self.advance_guard_timeout = timeout;
        self
    }

    pub fn with_shuffle_history_size(mut self, size: usize) -> Self {
        self.shuffle_history_size = size;
        self
    }

    /// Set the fade length; `Duration::ZERO` pauses immediately.
    pub fn with_fade(mut self, duration: Duration, steps: u32) -> Self {
        self.fade_duration = duration;
        self.fade_steps = steps;
        self
    }

    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_skip_attempts == 0 {
            return Err(PlaybackError::InvalidConfig(
                "max_skip_attempts must be > 0".to_string(),
            ));
        }

        if self.advance_guard_timeout.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "advance_guard_timeout must be > 0".to_string(),
            ));
        }

        if !self.fade_duration.is_zero() && self.fade_steps == 0 {
            return Err(PlaybackError::InvalidConfig(
                "fade_steps must be > 0 when fading".to_string(),
            ));
        }

        if self.autosave_interval.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "autosave_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the sleep timer ramps the volume down before pausing.
    pub fn fades(&self) -> bool {
        !self.fade_duration.is_zero() && self.fade_steps > 0
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_max_skip_attempts() -> u32 {
    5
}

fn default_advance_guard_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shuffle_history_size() -> usize {
    5
}

fn default_fade_duration() -> Duration {
    Duration::from_secs(10)
}

fn default_fade_steps() -> u32 {
    20
}

fn default_autosave_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_session_max_age() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.max_skip_attempts, 5);
        assert_eq!(config.shuffle_history_size, 5);
        assert_eq!(config.advance_guard_timeout, Duration::from_secs(30));
        assert_eq!(config.session_max_age, Duration::from_secs(604_800));
        assert!(config.fades());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = PlaybackConfig::default().with_max_skip_attempts(0);
        assert!(matches!(
            config.validate(),
            Err(PlaybackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_fade_disables_ramp() {
        let config = PlaybackConfig::default().with_fade(Duration::ZERO, 0);
        assert!(!config.fades());
        assert!(config.validate().is_ok());

        let broken = PlaybackConfig::default().with_fade(Duration::from_secs(5), 0);
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlaybackConfig = serde_json::from_str(r#"{"max_skip_attempts": 3}"#).unwrap();
        assert_eq!(config.max_skip_attempts, 3);
        assert_eq!(config.shuffle_history_size, 5);
    }
}
