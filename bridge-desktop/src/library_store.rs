//! Library Storage using SQLite
//!
//! Implements the catalog, download record and metadata bridges over the
//! bundled library database:
//!
//! | Table          | Contents                                          |
//! |----------------|---------------------------------------------------|
//! | `reciters`     | Reciter names and theme colors                    |
//! | `surahs`       | The 114 surahs with Arabic and English names      |
//! | `downloads`    | One row per downloaded track, path relative to the data directory |
//! | `app_metadata` | Key-value pairs (`data_version`, `schema_version`, playback session) |

use async_trait::async_trait;
use bridge_traits::{
    catalog::{Reciter, Surah, Track, TrackCatalog, TrackKey, DEFAULT_CDN_BASE_URL},
    downloads::{DownloadRecord, DownloadRecordStore},
    error::{BridgeError, Result},
    storage::MetadataStore,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SCHEMA_VERSION: &str = "1";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS reciters (
        id TEXT PRIMARY KEY,
        name_en TEXT NOT NULL,
        name_ar TEXT NOT NULL,
        color_primary TEXT NOT NULL,
        color_secondary TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS surahs (
        number INTEGER PRIMARY KEY,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS downloads (
        reciter_id TEXT NOT NULL,
        surah_number INTEGER NOT NULL,
        local_file_path TEXT NOT NULL,
        downloaded_at TEXT NOT NULL,
        PRIMARY KEY (reciter_id, surah_number),
        FOREIGN KEY (reciter_id) REFERENCES reciters(id),
        FOREIGN KEY (surah_number) REFERENCES surahs(number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_metadata (
        key TEXT PRIMARY KEY,
        value TEXT
    )
    "#,
];

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> BridgeError {
    move |e| BridgeError::DatabaseError(format!("{}: {}", context, e))
}

/// SQLite-backed library store
///
/// A single instance serves as [`TrackCatalog`], [`DownloadRecordStore`] and
/// [`MetadataStore`]. Local availability is always checked against the file
/// on disk, so a download row without its file reports the track as remote.
pub struct SqliteLibraryStore {
    pool: SqlitePool,
    data_dir: PathBuf,
    cdn_base_url: String,
}

impl SqliteLibraryStore {
    /// Open (or create) the library database at `db_path`.
    ///
    /// `cdn_base_url` defaults to [`DEFAULT_CDN_BASE_URL`].
    pub async fn new(
        db_path: impl AsRef<Path>,
        data_dir: impl Into<PathBuf>,
        cdn_base_url: Option<String>,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to open library database"))?;

        let store = Self::from_pool(pool, data_dir.into(), cdn_base_url).await?;
        debug!(path = ?db_path, "Initialized library store");
        Ok(store)
    }

    /// Create an in-memory library store (for testing)
    pub async fn in_memory(data_dir: impl Into<PathBuf>) -> Result<Self> {
        // Every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error("Failed to open in-memory database"))?;

        Self::from_pool(pool, data_dir.into(), None).await
    }

    async fn from_pool(
        pool: SqlitePool,
        data_dir: PathBuf,
        cdn_base_url: Option<String>,
    ) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(db_error("Failed to create schema"))?;
        }

        sqlx::query("INSERT OR IGNORE INTO app_metadata (key, value) VALUES ('schema_version', ?)")
            .bind(SCHEMA_VERSION)
            .execute(&pool)
            .await
            .map_err(db_error("Failed to record schema version"))?;

        Ok(Self {
            pool,
            data_dir,
            cdn_base_url: cdn_base_url.unwrap_or_else(|| DEFAULT_CDN_BASE_URL.to_string()),
        })
    }

    // ------------------------------------------------------------------------
    // Catalog content
    // ------------------------------------------------------------------------

    /// Insert or update a reciter.
    pub async fn upsert_reciter(&self, reciter: &Reciter) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reciters (id, name_en, name_ar, color_primary, color_secondary)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name_en = excluded.name_en,
                name_ar = excluded.name_ar,
                color_primary = excluded.color_primary,
                color_secondary = excluded.color_secondary
            "#,
        )
        .bind(&reciter.id)
        .bind(&reciter.name_en)
        .bind(&reciter.name_ar)
        .bind(&reciter.color_primary)
        .bind(&reciter.color_secondary)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store reciter"))?;
        Ok(())
    }

    /// Insert or update surahs in one transaction.
    pub async fn upsert_surahs(&self, surahs: &[Surah]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        for surah in surahs {
            sqlx::query(
                r#"
                INSERT INTO surahs (number, name_ar, name_en) VALUES (?, ?, ?)
                ON CONFLICT(number) DO UPDATE SET
                    name_ar = excluded.name_ar,
                    name_en = excluded.name_en
                "#,
            )
            .bind(i64::from(surah.number))
            .bind(&surah.name_ar)
            .bind(&surah.name_en)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to store surah"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit surahs"))?;
        Ok(())
    }

    /// All reciters ordered by English name.
    pub async fn reciters(&self) -> Result<Vec<Reciter>> {
        let rows = sqlx::query(
            "SELECT id, name_en, name_ar, color_primary, color_secondary FROM reciters ORDER BY name_en",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list reciters"))?;

        Ok(rows.iter().map(Self::reciter_from_row).collect())
    }

    /// Look up a reciter.
    pub async fn reciter(&self, id: &str) -> Result<Option<Reciter>> {
        let row = sqlx::query(
            "SELECT id, name_en, name_ar, color_primary, color_secondary FROM reciters WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get reciter"))?;

        Ok(row.as_ref().map(Self::reciter_from_row))
    }

    /// All surahs in order.
    pub async fn surahs(&self) -> Result<Vec<Surah>> {
        let rows = sqlx::query("SELECT number, name_ar, name_en FROM surahs ORDER BY number")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list surahs"))?;

        rows.iter()
            .map(|row| {
                Ok(Surah {
                    number: Self::surah_number(row, "number")?,
                    name_ar: row.get("name_ar"),
                    name_en: row.get("name_en"),
                })
            })
            .collect()
    }

    /// Version of the bundled catalog content, if recorded.
    pub async fn data_version(&self) -> Result<Option<String>> {
        self.get("data_version").await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn reciter_from_row(row: &SqliteRow) -> Reciter {
        Reciter {
            id: row.get("id"),
            name_en: row.get("name_en"),
            name_ar: row.get("name_ar"),
            color_primary: row.get("color_primary"),
            color_secondary: row.get("color_secondary"),
        }
    }

    fn surah_number(row: &SqliteRow, column: &str) -> Result<u32> {
        let number: i64 = row.get(column);
        u32::try_from(number)
            .map_err(|_| BridgeError::DatabaseError(format!("Invalid surah number {}", number)))
    }

    fn record_from_row(row: &SqliteRow) -> Result<DownloadRecord> {
        let downloaded_at: String = row.get("downloaded_at");
        let downloaded_at = DateTime::parse_from_rfc3339(&downloaded_at)
            .map_err(|e| {
                BridgeError::DatabaseError(format!(
                    "Invalid download timestamp '{}': {}",
                    downloaded_at, e
                ))
            })?
            .with_timezone(&Utc);
        let local_path: String = row.get("local_file_path");

        Ok(DownloadRecord {
            collection_id: row.get("reciter_id"),
            item_id: Self::surah_number(row, "surah_number")?,
            local_path: PathBuf::from(local_path),
            downloaded_at,
        })
    }

    /// Absolute path of a stored relative path, if the file is present.
    async fn existing_file(&self, relative: &str) -> Option<PathBuf> {
        let path = self.data_dir.join(relative);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            Ok(false) => None,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to check downloaded file");
                None
            }
        }
    }

    async fn stored_path(&self, key: &TrackKey) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT local_file_path FROM downloads WHERE reciter_id = ? AND surah_number = ?",
        )
        .bind(&key.collection_id)
        .bind(i64::from(key.item_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get download"))?;

        Ok(row.map(|r| r.get("local_file_path")))
    }

    fn records(rows: Vec<SqliteRow>) -> Result<Vec<DownloadRecord>> {
        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait]
impl TrackCatalog for SqliteLibraryStore {
    async fn get_all_tracks_for(&self, collection_id: &str) -> Result<Vec<Track>> {
        if self.reciter(collection_id).await?.is_none() {
            debug!(reciter = collection_id, "Unknown reciter");
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT s.number, s.name_en, d.local_file_path
            FROM surahs s
            LEFT JOIN downloads d ON d.surah_number = s.number AND d.reciter_id = ?
            ORDER BY s.number
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list tracks"))?;

        let mut tracks = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = TrackKey::new(collection_id, Self::surah_number(row, "number")?);
            let name: String = row.get("name_en");
            let stored: Option<String> = row.get("local_file_path");

            let local = match stored {
                Some(relative) => self.existing_file(&relative).await,
                None => None,
            };
            tracks.push(match local {
                Some(path) => Track::local(key, name, path),
                None => {
                    let url = key.remote_url(&self.cdn_base_url);
                    Track::remote(key, name, url)
                }
            });
        }

        Ok(tracks)
    }

    async fn is_locally_available(&self, key: &TrackKey) -> Result<bool> {
        Ok(self.local_path_for(key).await?.is_some())
    }

    async fn local_path_for(&self, key: &TrackKey) -> Result<Option<PathBuf>> {
        match self.stored_path(key).await? {
            Some(relative) => Ok(self.existing_file(&relative).await),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DownloadRecordStore for SqliteLibraryStore {
    async fn insert(&self, record: &DownloadRecord) -> Result<()> {
        let local_path = record.local_path.to_string_lossy().replace('\\', "/");

        sqlx::query(
            r#"
            INSERT INTO downloads (reciter_id, surah_number, local_file_path, downloaded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(reciter_id, surah_number) DO UPDATE SET
                local_file_path = excluded.local_file_path,
                downloaded_at = excluded.downloaded_at
            "#,
        )
        .bind(&record.collection_id)
        .bind(i64::from(record.item_id))
        .bind(&local_path)
        .bind(record.downloaded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to store download"))?;

        debug!(key = %record.key(), path = %local_path, "Stored download record");
        Ok(())
    }

    async fn get_one(&self, key: &TrackKey) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query(
            "SELECT * FROM downloads WHERE reciter_id = ? AND surah_number = ?",
        )
        .bind(&key.collection_id)
        .bind(i64::from(key.item_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get download"))?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query("SELECT * FROM downloads ORDER BY reciter_id, surah_number")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list downloads"))?;

        Self::records(rows)
    }

    async fn get_all_for(&self, collection_id: &str) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query("SELECT * FROM downloads WHERE reciter_id = ? ORDER BY surah_number")
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list downloads"))?;

        Self::records(rows)
    }

    async fn delete(&self, key: &TrackKey) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE reciter_id = ? AND surah_number = ?")
            .bind(&key.collection_id)
            .bind(i64::from(key.item_id))
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete download"))?;

        debug!(key = %key, "Deleted download record");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteLibraryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM app_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get metadata"))?;

        Ok(row.and_then(|r| r.get::<Option<String>, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_metadata (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to set metadata"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM app_metadata WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete metadata"))?;
        Ok(())
    }
}
