//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `TransferClient` using `reqwest` with `Range` resume
//! - `FileSystemAccess` using `tokio::fs`
//! - `TrackCatalog`, `DownloadRecordStore` and `MetadataStore` over the
//!   SQLite library database via `sqlx`
//! - `NetworkMonitor` probing the audio CDN
//! - `LifecycleObserver` driven by the host window
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestTransferClient, SqliteLibraryStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let data_dir = TokioFileSystem::default_data_dir();
//!     let fs = TokioFileSystem::with_data_dir(&data_dir);
//!     let transfers = ReqwestTransferClient::new()?;
//!     let library = SqliteLibraryStore::new(data_dir.join("qariee.db"), data_dir, None).await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod filesystem;
mod library_store;
mod lifecycle;
mod network;
mod transfer;

pub use filesystem::TokioFileSystem;
pub use library_store::SqliteLibraryStore;
pub use lifecycle::DesktopLifecycleObserver;
pub use network::DesktopNetworkMonitor;
pub use transfer::ReqwestTransferClient;
