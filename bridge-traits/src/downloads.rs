//! Download Record Storage
//!
//! Narrow CRUD contract over the persisted `downloads` table. A record is the
//! proof that a track has been fetched to local storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::TrackKey;
use crate::error::Result;

/// Persisted download record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub collection_id: String,
    pub item_id: u32,
    /// Path relative to the application data directory
    pub local_path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(key: &TrackKey, local_path: impl Into<PathBuf>, downloaded_at: DateTime<Utc>) -> Self {
        Self {
            collection_id: key.collection_id.clone(),
            item_id: key.item_id,
            local_path: local_path.into(),
            downloaded_at,
        }
    }

    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.collection_id.clone(), self.item_id)
    }
}

/// Download record store trait
///
/// Records are only written after a transfer completed successfully.
/// `insert` replaces any existing record for the same key.
#[async_trait]
pub trait DownloadRecordStore: Send + Sync {
    /// Insert or replace a record
    async fn insert(&self, record: &DownloadRecord) -> Result<()>;

    /// Fetch a single record
    async fn get_one(&self, key: &TrackKey) -> Result<Option<DownloadRecord>>;

    /// Fetch every record
    async fn get_all(&self) -> Result<Vec<DownloadRecord>>;

    /// Fetch all records of one collection
    async fn get_all_for(&self, collection_id: &str) -> Result<Vec<DownloadRecord>>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, key: &TrackKey) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_round_trip() {
        let key = TrackKey::new("sudais", 36);
        let record = DownloadRecord::new(&key, key.relative_audio_path(), Utc::now());
        assert_eq!(record.key(), key);
        assert_eq!(record.item_id, 36);
    }
}
