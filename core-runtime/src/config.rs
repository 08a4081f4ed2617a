//! # Core Configuration Module
//!
//! Provides configuration management for the recitation player core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all bridges and settings the core needs. It enforces
//! fail-fast validation so that a missing capability is reported at start-up
//! with an actionable message instead of surfacing later as a runtime error.
//!
//! ## Required Dependencies
//!
//! - `TrackCatalog` - Tracks of a reciter with local availability
//! - `DownloadRecordStore` - Persisted download records
//! - `MetadataStore` - Key-value store for app metadata and the playback session
//!
//! A single object implementing all three (such as the desktop
//! `SqliteLibraryStore`) can be supplied with [`CoreConfigBuilder::library_store`].
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//! - `TransferClient` - Resumable downloads (desktop default: reqwest)
//! - `NetworkMonitor` - Connectivity detection (desktop default: TCP probe)
//! - `LifecycleObserver` - App lifecycle (desktop default: always foreground)
//! - `Clock` - Wall clock (default: `SystemClock`)
//! - `AudioOutput` - May also be attached later on the playback engine
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteLibraryStore::new(db_path, data_dir.clone(), None).await?);
//! let config = CoreConfig::builder()
//!     .database_path(db_path)
//!     .data_dir(data_dir)
//!     .library_store(store)
//!     .audio_output(Arc::new(MyAudioOutput))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing the catalog and stores
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/qariee.db")
//!     .data_dir("/path/to/data")
//!     .build()
//!     .expect("Should fail - missing required bridges");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AudioOutput, Clock, DownloadRecordStore, FileSystemAccess, LifecycleObserver, MetadataStore,
    NetworkMonitor, SystemClock, TrackCatalog, TransferClient,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use bridge_traits::catalog::DEFAULT_CDN_BASE_URL;

/// Core configuration for the recitation player core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Application data directory; audio lives under `audio/`
    pub data_dir: PathBuf,

    /// Base URL of the audio CDN
    pub cdn_base_url: String,

    /// Catalog of tracks (required)
    pub catalog: Arc<dyn TrackCatalog>,

    /// Download record persistence (required)
    pub download_records: Arc<dyn DownloadRecordStore>,

    /// Key-value metadata persistence (required)
    pub metadata_store: Arc<dyn MetadataStore>,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Resumable transfer primitive
    pub transfer_client: Arc<dyn TransferClient>,

    /// Host audio output (optional, can be attached later)
    pub audio_output: Option<Arc<dyn AudioOutput>>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// App lifecycle observer (optional)
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,

    /// Wall clock
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("data_dir", &self.data_dir)
            .field("cdn_base_url", &self.cdn_base_url)
            .field("catalog", &"TrackCatalog { ... }")
            .field("download_records", &"DownloadRecordStore { ... }")
            .field("metadata_store", &"MetadataStore { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("transfer_client", &"TransferClient { ... }")
            .field(
                "audio_output",
                &self.audio_output.as_ref().map(|_| "AudioOutput { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "lifecycle_observer",
                &self
                    .lifecycle_observer
                    .as_ref()
                    .map(|_| "LifecycleObserver { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Data directory is not empty
    /// - CDN base URL is an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if !(self.cdn_base_url.starts_with("https://") || self.cdn_base_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "CDN base URL must start with http:// or https://, got '{}'",
                self.cdn_base_url
            )));
        }

        Ok(())
    }

    /// Directory holding downloaded audio files.
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}

fn missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

fn catalog_missing_error() -> Error {
    missing(
        "TrackCatalog",
        "TrackCatalog implementation is required to resolve tracks. \
         Desktop: pass a SqliteLibraryStore via .library_store(). \
         Mobile: inject a catalog backed by the platform database.",
    )
}

fn download_records_missing_error() -> Error {
    missing(
        "DownloadRecordStore",
        "DownloadRecordStore implementation is required for offline downloads. \
         Desktop: pass a SqliteLibraryStore via .library_store(). \
         Mobile: inject a store backed by the platform database.",
    )
}

fn metadata_store_missing_error() -> Error {
    missing(
        "MetadataStore",
        "MetadataStore implementation is required for session persistence. \
         Desktop: pass a SqliteLibraryStore via .library_store(). \
         Mobile: inject UserDefaults/DataStore-backed storage.",
    )
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::with_data_dir(data_dir));
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(missing(
        "FileSystemAccess",
        "FileSystemAccess implementation is required for downloads. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
         Mobile: inject sandboxed document-directory access.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_transfer_client() -> Result<Arc<dyn TransferClient>> {
    use bridge_desktop::ReqwestTransferClient;

    let client = ReqwestTransferClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default TransferClient: {}", e))
    })?;
    let client: Arc<dyn TransferClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_transfer_client() -> Result<Arc<dyn TransferClient>> {
    Err(missing(
        "TransferClient",
        "TransferClient implementation is required for downloads. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestTransferClient. \
         Mobile: inject URLSession/DownloadManager-backed transfers.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_lifecycle_observer() -> Option<Arc<dyn LifecycleObserver>> {
    Some(Arc::new(bridge_desktop::DesktopLifecycleObserver::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_lifecycle_observer() -> Option<Arc<dyn LifecycleObserver>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    cdn_base_url: Option<String>,
    catalog: Option<Arc<dyn TrackCatalog>>,
    download_records: Option<Arc<dyn DownloadRecordStore>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    transfer_client: Option<Arc<dyn TransferClient>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/qariee.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the application data directory.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Overrides the audio CDN base URL.
    pub fn cdn_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_base_url = Some(url.into());
        self
    }

    /// Sets the track catalog implementation (required).
    pub fn catalog(mut self, catalog: Arc<dyn TrackCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets the download record store implementation (required).
    pub fn download_records(mut self, store: Arc<dyn DownloadRecordStore>) -> Self {
        self.download_records = Some(store);
        self
    }

    /// Sets the metadata store implementation (required).
    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Sets catalog, download records and metadata from one store.
    pub fn library_store<S>(self, store: Arc<S>) -> Self
    where
        S: TrackCatalog + DownloadRecordStore + MetadataStore + 'static,
    {
        self.catalog(store.clone())
            .download_records(store.clone())
            .metadata_store(store)
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the transfer client implementation.
    pub fn transfer_client(mut self, client: Arc<dyn TransferClient>) -> Self {
        self.transfer_client = Some(client);
        self
    }

    /// Sets the audio output implementation.
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    /// Sets the network monitor implementation.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the lifecycle observer implementation.
    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    /// Sets the clock implementation.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns an error if:
    /// - Required bridges are missing (TrackCatalog, DownloadRecordStore, MetadataStore)
    /// - A bridge without a platform default is missing
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let catalog = self.catalog.ok_or_else(catalog_missing_error)?;
        let download_records = self
            .download_records
            .ok_or_else(download_records_missing_error)?;
        let metadata_store = self
            .metadata_store
            .ok_or_else(metadata_store_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&data_dir)?,
        };

        let transfer_client = match self.transfer_client {
            Some(client) => client,
            None => provide_default_transfer_client()?,
        };

        let config = CoreConfig {
            database_path,
            data_dir,
            cdn_base_url: self
                .cdn_base_url
                .unwrap_or_else(|| DEFAULT_CDN_BASE_URL.to_string()),
            catalog,
            download_records,
            metadata_store,
            file_system,
            transfer_client,
            audio_output: self.audio_output,
            network_monitor: self
                .network_monitor
                .or_else(provide_default_network_monitor),
            lifecycle_observer: self
                .lifecycle_observer
                .or_else(provide_default_lifecycle_observer),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::FileMetadata;
    use bridge_traits::transfer::{TransferHandle, TransferRequest};
    use bridge_traits::{DownloadRecord, Track, TrackKey};
    use bytes::Bytes;

    struct MockLibrary;

    #[async_trait]
    impl TrackCatalog for MockLibrary {
        async fn get_all_tracks_for(&self, _collection_id: &str) -> BridgeResult<Vec<Track>> {
            Ok(vec![])
        }

        async fn is_locally_available(&self, _key: &TrackKey) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn local_path_for(&self, _key: &TrackKey) -> BridgeResult<Option<PathBuf>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl DownloadRecordStore for MockLibrary {
        async fn insert(&self, _record: &DownloadRecord) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_one(&self, _key: &TrackKey) -> BridgeResult<Option<DownloadRecord>> {
            Ok(None)
        }

        async fn get_all(&self) -> BridgeResult<Vec<DownloadRecord>> {
            Ok(vec![])
        }

        async fn get_all_for(&self, _collection_id: &str) -> BridgeResult<Vec<DownloadRecord>> {
            Ok(vec![])
        }

        async fn delete(&self, _key: &TrackKey) -> BridgeResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl MetadataStore for MockLibrary {
        async fn get(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockFs;

    #[async_trait]
    impl FileSystemAccess for MockFs {
        async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/data"))
        }

        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Err(bridge_traits::BridgeError::NotFound("none".to_string()))
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockTransfer;

    #[async_trait]
    impl TransferClient for MockTransfer {
        async fn start(&self, _request: TransferRequest) -> BridgeResult<Box<dyn TransferHandle>> {
            Err(bridge_traits::BridgeError::NotAvailable("offline".to_string()))
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/db/qariee.db")
            .data_dir("/data")
            .library_store(Arc::new(MockLibrary))
            .file_system(Arc::new(MockFs))
            .transfer_client(Arc::new(MockTransfer))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .data_dir("/data")
            .library_store(Arc::new(MockLibrary))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_data_dir() {
        let result = CoreConfig::builder()
            .database_path("/db/qariee.db")
            .library_store(Arc::new(MockLibrary))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Data directory is required"));
    }

    #[test]
    fn test_builder_requires_catalog() {
        let result = CoreConfig::builder()
            .database_path("/db/qariee.db")
            .data_dir("/data")
            .download_records(Arc::new(MockLibrary))
            .metadata_store(Arc::new(MockLibrary))
            .build();

        let err = result.unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "TrackCatalog"));
        assert!(err.to_string().contains("resolve tracks"));
    }

    #[test]
    fn test_builder_requires_metadata_store() {
        let result = CoreConfig::builder()
            .database_path("/db/qariee.db")
            .data_dir("/data")
            .catalog(Arc::new(MockLibrary))
            .download_records(Arc::new(MockLibrary))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("MetadataStore"));
        assert!(err_msg.contains("session persistence"));
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/db/qariee.db"));
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.audio_dir(), PathBuf::from("/data").join("audio"));
        assert_eq!(config.cdn_base_url, DEFAULT_CDN_BASE_URL);
        assert!(config.audio_output.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_cdn_url() {
        let result = complete_builder().cdn_base_url("ftp://cdn").build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_transfer_client_without_shims() {
        let result = CoreConfig::builder()
            .database_path("/db/qariee.db")
            .data_dir("/data")
            .library_store(Arc::new(MockLibrary))
            .file_system(Arc::new(MockFs))
            .build();

        assert!(result.unwrap_err().to_string().contains("TransferClient"));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder()
            .database_path("/db/qariee.db")
            .data_dir(std::env::temp_dir().join("qariee-config-test"))
            .library_store(Arc::new(MockLibrary))
            .build()
            .expect("desktop defaults should succeed");

        assert!(config.network_monitor.is_some());
        assert!(config.lifecycle_observer.is_some());
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = complete_builder().build().unwrap();
        let cloned = config.clone();
        assert_eq!(config.database_path, cloned.database_path);
        assert!(format!("{:?}", cloned).contains("TrackCatalog { ... }"));
    }
}
