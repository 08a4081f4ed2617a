//! Download progress reported to callbacks and point queries

use bridge_traits::TrackKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Failed)
    }
}

/// Progress of a single track download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub collection_id: String,
    pub item_id: u32,
    /// Percentage (0-100)
    pub progress: u8,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub status: DownloadStatus,
    /// Failure reason, set only for `Failed`
    pub error: Option<String>,
}

impl DownloadProgress {
    fn with_status(key: &TrackKey, status: DownloadStatus) -> Self {
        Self {
            collection_id: key.collection_id.clone(),
            item_id: key.item_id,
            progress: 0,
            total_bytes: None,
            downloaded_bytes: 0,
            status,
            error: None,
        }
    }

    pub fn queued(key: &TrackKey) -> Self {
        Self::with_status(key, DownloadStatus::Queued)
    }

    pub fn downloading(key: &TrackKey, downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            progress: percent(downloaded_bytes, total_bytes),
            total_bytes,
            downloaded_bytes,
            ..Self::with_status(key, DownloadStatus::Downloading)
        }
    }

    pub fn completed(key: &TrackKey, total_bytes: u64) -> Self {
        Self {
            progress: 100,
            total_bytes: Some(total_bytes),
            downloaded_bytes: total_bytes,
            ..Self::with_status(key, DownloadStatus::Completed)
        }
    }

    pub fn failed(key: &TrackKey, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(key, DownloadStatus::Failed)
        }
    }

    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.collection_id.clone(), self.item_id)
    }
}

/// Percentage of `total`, 0 when the total is unknown or zero.
pub fn percent(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let percent = (downloaded as f64 / total as f64) * 100.0;
            percent.min(100.0) as u8
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_guards_unknown_total() {
        assert_eq!(percent(500, None), 0);
        assert_eq!(percent(500, Some(0)), 0);
        assert_eq!(percent(250, Some(1000)), 25);
        assert_eq!(percent(2000, Some(1000)), 100);
    }

    #[test]
    fn test_constructors() {
        let key = TrackKey::new("ajamy", 112);

        let downloading = DownloadProgress::downloading(&key, 50, Some(200));
        assert_eq!(downloading.progress, 25);
        assert_eq!(downloading.key(), key);

        let completed = DownloadProgress::completed(&key, 200);
        assert_eq!(completed.progress, 100);
        assert!(completed.status.is_terminal());

        let failed = DownloadProgress::failed(&key, "HTTP 500");
        assert_eq!(failed.error.as_deref(), Some("HTTP 500"));
        assert!(!DownloadStatus::Queued.is_terminal());
    }
}
