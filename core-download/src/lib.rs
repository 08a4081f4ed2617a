//! # Download Manager
//!
//! Fetches remote recitations into local storage.
//!
//! ## Overview
//!
//! This module handles:
//! - Bounded-concurrency transfers with a FIFO waiting queue
//! - Resumable retries with exponential backoff
//! - Per-track progress callbacks alongside [`core_runtime::events::DownloadEvent`]s
//! - Download records that are cross-checked against files on disk

pub mod config;
pub mod error;
pub mod manager;
pub mod progress;

pub use config::DownloadConfig;
pub use error::{DownloadError, Result};
pub use manager::{DownloadManager, ProgressCallback};
pub use progress::{DownloadProgress, DownloadStatus};
