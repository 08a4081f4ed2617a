//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O and the small string
//! key-value store used for app metadata and persisted session state.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations to support different platforms:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app document directories
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn audio_dir(fs: &dyn FileSystemAccess) -> Result<PathBuf> {
///     let dir = fs.get_data_directory().await?.join("audio");
///     fs.create_dir_all(&dir).await?;
///     Ok(dir)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's data directory
    ///
    /// Downloaded audio lives below this directory.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a file, treating an already missing file as success
    async fn delete_file_if_exists(&self, path: &Path) -> Result<bool> {
        if self.exists(path).await? {
            self.delete_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Size of a file in bytes, or `None` when it does not exist
    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        if !self.exists(path).await? {
            return Ok(None);
        }
        let metadata = self.metadata(path).await?;
        Ok(Some(metadata.size))
    }
}

/// String key-value store trait
///
/// Mirrors the `app_metadata` table: small values such as the data version
/// or the serialized playback session.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::MetadataStore;
///
/// async fn data_version(store: &dyn MetadataStore) -> Result<Option<String>> {
///     store.get("data_version").await
/// }
/// ```
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Retrieve a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
