//! Download configuration

use core_runtime::config::DEFAULT_CDN_BASE_URL;
use std::time::Duration;

use crate::error::{DownloadError, Result};

/// Configuration for the download manager.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Base URL audio files are fetched from
    pub cdn_base_url: String,

    /// Number of transfers allowed at once (default: 2)
    pub max_concurrent_downloads: usize,

    /// Attempts per download, including the first (default: 3)
    pub max_retry_attempts: u32,

    /// Delay before the first retry; doubles on each further retry (default: 2s)
    pub retry_base_delay: Duration,

    /// Upper bound for a single attempt (default: 300s)
    pub download_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cdn_base_url: DEFAULT_CDN_BASE_URL.to_string(),
            max_concurrent_downloads: 2,
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            download_timeout: Duration::from_secs(300),
        }
    }
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cdn_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_base_url = url.into();
        self
    }

    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        if self.max_retry_attempts == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }

        if self.download_timeout.is_zero() {
            return Err(DownloadError::InvalidConfig(
                "download_timeout must be greater than 0".to_string(),
            ));
        }

        if !self.cdn_base_url.starts_with("http://") && !self.cdn_base_url.starts_with("https://")
        {
            return Err(DownloadError::InvalidConfig(format!(
                "cdn_base_url must be an http(s) URL: {}",
                self.cdn_base_url
            )));
        }

        Ok(())
    }
}
