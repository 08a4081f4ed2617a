//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the recitation player core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that must be implemented differently per platform
//! (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Catalog & Records
//! - [`TrackCatalog`](catalog::TrackCatalog) - Tracks of a reciter with local availability
//! - [`DownloadRecordStore`](downloads::DownloadRecordStore) - Persisted download records
//! - [`MetadataStore`](storage::MetadataStore) - Small key-value store (data version, session)
//!
//! ### Networking & I/O
//! - [`TransferClient`](transfer::TransferClient) - Resumable file transfers
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O below the app data directory
//!
//! ### Platform Integration
//! - [`AudioOutput`](playback::AudioOutput) - Host audio player driven by the core
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection
//! - [`LifecycleObserver`](lifecycle::LifecycleObserver) - App foreground/background transitions
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let catalog = builder.catalog
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "TrackCatalog".to_string(),
//!         message: "No track catalog provided. \
//!                  Desktop: use SqliteLibraryStore. \
//!                  Mobile: inject platform-native adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and report a missing remote resource as [`BridgeError::NotFound`] so the
//! core can skip retries.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod catalog;
pub mod downloads;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod playback;
pub mod storage;
pub mod time;
pub mod transfer;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{
    Reciter, Surah, Track, TrackCatalog, TrackKey, DEFAULT_CDN_BASE_URL, SURAH_COUNT,
};
pub use downloads::{DownloadRecord, DownloadRecordStore};
pub use lifecycle::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use playback::{
    AudioOutput, AudioOutputEvent, AudioOutputEventStream, AudioSource, OutputState,
    PlaybackMetadata,
};
pub use storage::{FileMetadata, FileSystemAccess, MetadataStore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
pub use transfer::{TransferClient, TransferEvent, TransferHandle, TransferRequest};
