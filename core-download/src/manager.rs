//! # Download Manager
//!
//! Fetches remote audio into local storage with bounded concurrency.
//!
//! ## Overview
//!
//! - At most `max_concurrent_downloads` transfers run at once; further
//!   requests wait in strict FIFO order and are promoted one at a time as
//!   active transfers finish or are cancelled.
//! - A second request for a key that is already active or waiting attaches
//!   its callback to the existing task instead of starting another transfer.
//! - The download record store is the source of truth for "downloaded", and
//!   it is always cross-checked against the file on disk. Records whose file
//!   is gone are pruned on read.
//! - Transfer failures never surface as errors from [`DownloadManager::download_track`];
//!   they end in a `failed` progress event.

use bridge_traits::{
    Clock, DownloadRecord, DownloadRecordStore, FileSystemAccess, TrackKey, TransferClient,
    TransferEvent, TransferRequest,
};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::progress::DownloadProgress;

/// Observer of a single track's download progress.
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct DownloadTask {
    key: TrackKey,
    url: String,
    /// Relative to the data directory; this is what the record stores.
    relative_path: PathBuf,
    destination: PathBuf,
}

struct ActiveTask {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
    progress: DownloadProgress,
}

#[derive(Default)]
struct State {
    active: HashMap<TrackKey, ActiveTask>,
    waiting: VecDeque<DownloadTask>,
    callbacks: HashMap<TrackKey, Vec<ProgressCallback>>,
}

impl State {
    fn snapshot(&self, key: &TrackKey) -> Option<DownloadProgress> {
        if let Some(active) = self.active.get(key) {
            return Some(active.progress.clone());
        }
        self.waiting
            .iter()
            .any(|task| &task.key == key)
            .then(|| DownloadProgress::queued(key))
    }
}

struct Inner {
    config: DownloadConfig,
    records: Arc<dyn DownloadRecordStore>,
    fs: Arc<dyn FileSystemAccess>,
    transfer: Arc<dyn TransferClient>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    state: Mutex<State>,
}

// ============================================================================
// Manager
// ============================================================================

/// Download manager.
///
/// Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    pub fn new(
        config: DownloadConfig,
        records: Arc<dyn DownloadRecordStore>,
        fs: Arc<dyn FileSystemAccess>,
        transfer: Arc<dyn TransferClient>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                records,
                fs,
                transfer,
                clock,
                events,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    /// Download a track unless it is already downloaded, active or waiting.
    ///
    /// A `queued` event is delivered before this returns. An error is only
    /// returned when the request could not be set up; transfer failures are
    /// reported through `on_progress` and the event bus.
    #[instrument(skip(self, on_progress))]
    pub async fn download_track(
        &self,
        collection_id: &str,
        item_id: u32,
        on_progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let key = TrackKey::new(collection_id, item_id);

        if self.attach(&key, on_progress.as_ref()) {
            return Ok(());
        }

        if self.is_downloaded(collection_id, item_id).await? {
            debug!("Already downloaded");
            return Ok(());
        }

        let task = self.prepare_task(&key).await?;

        let start_now = {
            let mut state = self.inner.state.lock();
            if state.snapshot(&key).is_none() {
                if let Some(callback) = on_progress.clone() {
                    state.callbacks.entry(key.clone()).or_default().push(callback);
                }
                if state.active.len() < self.inner.config.max_concurrent_downloads {
                    state.active.insert(
                        key.clone(),
                        ActiveTask {
                            token: CancellationToken::new(),
                            join: None,
                            progress: DownloadProgress::downloading(&key, 0, None),
                        },
                    );
                    Some(true)
                } else {
                    state.waiting.push_back(task.clone());
                    Some(false)
                }
            } else {
                None
            }
        };

        let Some(start_now) = start_now else {
            // Another request registered the key while we were preparing.
            self.attach(&key, on_progress.as_ref());
            return Ok(());
        };

        info!(start_now, "Download queued");
        self.notify(&DownloadProgress::queued(&key));
        self.emit(DownloadEvent::Queued { key: key.clone() });

        if start_now {
            self.spawn_task(task);
        }
        Ok(())
    }

    /// Attach `callback` to an existing task, replaying its current status.
    fn attach(&self, key: &TrackKey, callback: Option<&ProgressCallback>) -> bool {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let Some(snapshot) = state.snapshot(key) else {
                return false;
            };
            if let Some(callback) = callback {
                state
                    .callbacks
                    .entry(key.clone())
                    .or_default()
                    .push(callback.clone());
            }
            snapshot
        };

        debug!(%key, "Joining existing download");
        if let Some(callback) = callback {
            callback(&snapshot);
        }
        true
    }

    async fn prepare_task(&self, key: &TrackKey) -> Result<DownloadTask> {
        let relative_path = key.relative_audio_path();
        let destination = self.resolve(&relative_path).await?;
        if let Some(parent) = destination.parent() {
            self.inner.fs.create_dir_all(parent).await?;
        }

        Ok(DownloadTask {
            key: key.clone(),
            url: key.remote_url(&self.inner.config.cdn_base_url),
            relative_path,
            destination,
        })
    }

    /// Cancel an active or waiting download.
    ///
    /// An active transfer is stopped and its partial file removed before
    /// this returns. No terminal progress event is delivered.
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, collection_id: &str, item_id: u32) -> Result<()> {
        let key = TrackKey::new(collection_id, item_id);

        let (active, was_waiting) = {
            let mut state = self.inner.state.lock();
            if let Some(active) = state.active.remove(&key) {
                state.callbacks.remove(&key);
                (Some(active), false)
            } else if let Some(pos) = state.waiting.iter().position(|t| t.key == key) {
                state.waiting.remove(pos);
                state.callbacks.remove(&key);
                (None, true)
            } else {
                (None, false)
            }
        };

        if let Some(mut active) = active {
            active.token.cancel();
            if let Some(join) = active.join.take() {
                if let Err(e) = join.await {
                    warn!(error = %e, "Cancelled download task ended abnormally");
                }
            }

            let partial = self.resolve(&key.relative_audio_path()).await?;
            let file = partial.to_string_lossy();
            match self.inner.fs.delete_file_if_exists(&partial).await {
                Ok(true) => debug!(file = %strip_path(&file), "Removed partial file"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to remove partial file"),
            }

            info!("Active download cancelled");
            self.emit_cancelled(&key);
            self.promote_waiting();
        } else if was_waiting {
            info!("Queued download cancelled");
            self.emit_cancelled(&key);
        }

        Ok(())
    }

    /// Delete a downloaded track. Missing records and files are not errors.
    #[instrument(skip(self))]
    pub async fn delete_download(&self, collection_id: &str, item_id: u32) -> Result<()> {
        let key = TrackKey::new(collection_id, item_id);
        let Some(record) = self.inner.records.get_one(&key).await? else {
            return Ok(());
        };

        let path = self.resolve(&record.local_path).await?;
        self.inner.fs.delete_file_if_exists(&path).await?;
        self.inner.records.delete(&key).await?;

        info!("Download deleted");
        self.emit(DownloadEvent::Deleted { key });
        Ok(())
    }

    /// Whether the track has a record backed by a file on disk.
    ///
    /// A record without its file is deleted.
    pub async fn is_downloaded(&self, collection_id: &str, item_id: u32) -> Result<bool> {
        let key = TrackKey::new(collection_id, item_id);
        let Some(record) = self.inner.records.get_one(&key).await? else {
            return Ok(false);
        };
        self.verify(&record).await
    }

    /// Verified download records of a collection.
    pub async fn downloaded_for(&self, collection_id: &str) -> Result<Vec<DownloadRecord>> {
        let records = self.inner.records.get_all_for(collection_id).await?;
        let mut verified = Vec::with_capacity(records.len());
        for record in records {
            if self.verify(&record).await? {
                verified.push(record);
            }
        }
        Ok(verified)
    }

    /// Total size of downloaded files in bytes.
    ///
    /// Records with missing files are skipped; a failed listing counts as 0.
    pub async fn get_storage_used(&self) -> u64 {
        let records = match self.inner.records.get_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to list download records");
                return 0;
            }
        };

        let mut total = 0u64;
        for record in records {
            let Ok(path) = self.resolve(&record.local_path).await else {
                continue;
            };
            if let Ok(Some(size)) = self.inner.fs.file_size(&path).await {
                total = total.saturating_add(size);
            }
        }
        total
    }

    /// Current status of a download: `Downloading` if active, `Queued` if
    /// waiting, `None` otherwise.
    pub fn get_progress(&self, collection_id: &str, item_id: u32) -> Option<DownloadProgress> {
        let key = TrackKey::new(collection_id, item_id);
        self.inner.state.lock().snapshot(&key)
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().waiting.len()
    }

    /// Stop all transfers and drop the waiting queue.
    ///
    /// Partial files are kept so a later request resumes them.
    pub async fn shutdown(&self) {
        let joins: Vec<JoinHandle<()>> = {
            let mut state = self.inner.state.lock();
            state.waiting.clear();
            state.callbacks.clear();
            state
                .active
                .drain()
                .filter_map(|(_, mut active)| {
                    active.token.cancel();
                    active.join.take()
                })
                .collect()
        };

        for join in joins {
            if let Err(e) = join.await {
                warn!(error = %e, "Download task ended abnormally during shutdown");
            }
        }
        debug!("Download manager stopped");
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn spawn_task(&self, task: DownloadTask) {
        let mut state = self.inner.state.lock();
        // Cancelled before it got to start.
        let Some(active) = state.active.get_mut(&task.key) else {
            return;
        };

        let manager = self.clone();
        let token = active.token.clone();
        active.join = Some(tokio::spawn(async move {
            manager.supervise(task, token).await;
        }));
    }

    /// Runs the transfer in its own task so a panic is reported as a failure.
    async fn supervise(&self, task: DownloadTask, token: CancellationToken) {
        let manager = self.clone();
        let worker_task = task.clone();
        let worker_token = token.clone();
        let worker = tokio::spawn(async move {
            manager.download_with_retry(&worker_task, &worker_token).await
        });

        let result = match worker.await {
            Ok(result) => result,
            Err(e) => Err(DownloadError::Transfer(format!("download task aborted: {e}"))),
        };

        if token.is_cancelled() {
            debug!(key = %task.key, "Download stopped by cancellation");
            return;
        }

        self.finish(&task, result).await;
    }

    async fn download_with_retry(
        &self,
        task: &DownloadTask,
        token: &CancellationToken,
    ) -> Result<u64> {
        let config = &self.inner.config;
        let mut last_error = None;

        for attempt in 1..=config.max_retry_attempts {
            let resume_from = self
                .inner
                .fs
                .file_size(&task.destination)
                .await
                .ok()
                .flatten()
                .unwrap_or(0);
            debug!(
                key = %task.key,
                attempt,
                max_attempts = config.max_retry_attempts,
                resume_from,
                "Starting transfer attempt"
            );

            match tokio::time::timeout(
                config.download_timeout,
                self.transfer_once(task, resume_from, token),
            )
            .await
            {
                Ok(Ok(total_bytes)) => return Ok(total_bytes),
                Ok(Err(DownloadError::Cancelled)) => return Err(DownloadError::Cancelled),
                Ok(Err(e)) if !e.is_retryable() => return Err(e),
                Ok(Err(e)) => {
                    warn!(key = %task.key, attempt, error = %e, "Transfer attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(key = %task.key, attempt, "Transfer attempt timed out");
                    last_error = Some(DownloadError::Timeout(config.download_timeout));
                }
            }

            if attempt < config.max_retry_attempts {
                tokio::select! {
                    _ = token.cancelled() => return Err(DownloadError::Cancelled),
                    _ = tokio::time::sleep(config.retry_delay(attempt)) => {}
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DownloadError::Transfer("download failed after all retries".to_string())
        }))
    }

    async fn transfer_once(
        &self,
        task: &DownloadTask,
        resume_from: u64,
        token: &CancellationToken,
    ) -> Result<u64> {
        let request = TransferRequest::new(task.url.clone(), task.destination.clone())
            .resume_from(resume_from);
        let mut handle = self.inner.transfer.start(request).await?;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    if let Err(e) = handle.pause().await {
                        warn!(key = %task.key, error = %e, "Failed to pause transfer");
                    }
                    return Err(DownloadError::Cancelled);
                }
                event = handle.next_event() => match event {
                    Some(Ok(TransferEvent::Progress { downloaded_bytes, total_bytes })) => {
                        self.report_progress(&task.key, downloaded_bytes, total_bytes);
                    }
                    Some(Ok(TransferEvent::Completed { total_bytes })) => return Ok(total_bytes),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(DownloadError::Transfer(
                            "transfer ended before completion".to_string(),
                        ))
                    }
                },
            }
        }
    }

    fn report_progress(&self, key: &TrackKey, downloaded_bytes: u64, total_bytes: Option<u64>) {
        let progress = DownloadProgress::downloading(key, downloaded_bytes, total_bytes);
        let percent_changed = {
            let mut state = self.inner.state.lock();
            match state.active.get_mut(key) {
                Some(active) => {
                    let changed = active.progress.progress != progress.progress;
                    active.progress = progress.clone();
                    changed
                }
                None => return,
            }
        };

        self.notify(&progress);
        if percent_changed {
            self.emit(DownloadEvent::Progress {
                    key: key.clone(),
                    percent: progress.progress,
                    downloaded_bytes,
                    total_bytes,
                });
        }
    }

    async fn finish(&self, task: &DownloadTask, result: Result<u64>) {
        let key = &task.key;
        let outcome = match result {
            Ok(total_bytes) => {
                let record =
                    DownloadRecord::new(key, task.relative_path.clone(), self.inner.clock.now());
                match self.inner.records.insert(&record).await {
                    Ok(()) => Ok(total_bytes),
                    Err(e) => Err(DownloadError::Storage(format!(
                        "failed to save download record: {e}"
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        let callbacks = {
            let mut state = self.inner.state.lock();
            state.active.remove(key);
            state.callbacks.remove(key).unwrap_or_default()
        };

        let (progress, event) = match outcome {
            Ok(total_bytes) => {
                info!(%key, total_bytes, "Download completed");
                (
                    DownloadProgress::completed(key, total_bytes),
                    DownloadEvent::Completed {
                        key: key.clone(),
                        local_path: task.destination.display().to_string(),
                        total_bytes,
                    },
                )
            }
            Err(e) => {
                error!(%key, error = %e, "Download failed");
                let message = e.to_string();
                (
                    DownloadProgress::failed(key, message.clone()),
                    DownloadEvent::Failed {
                        key: key.clone(),
                        message,
                    },
                )
            }
        };

        for callback in &callbacks {
            callback(&progress);
        }
        self.emit(event);

        self.promote_waiting();
    }

    /// Move waiting tasks into free active slots, oldest first.
    fn promote_waiting(&self) {
        let promoted: Vec<DownloadTask> = {
            let mut state = self.inner.state.lock();
            let mut promoted = Vec::new();
            while state.active.len() < self.inner.config.max_concurrent_downloads {
                let Some(task) = state.waiting.pop_front() else {
                    break;
                };
                state.active.insert(
                    task.key.clone(),
                    ActiveTask {
                        token: CancellationToken::new(),
                        join: None,
                        progress: DownloadProgress::downloading(&task.key, 0, None),
                    },
                );
                promoted.push(task);
            }
            promoted
        };

        for task in promoted {
            debug!(key = %task.key, "Promoting waiting download");
            self.spawn_task(task);
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn notify(&self, progress: &DownloadProgress) {
        let key = progress.key();
        let callbacks = self
            .inner
            .state
            .lock()
            .callbacks
            .get(&key)
            .cloned()
            .unwrap_or_default();
        for callback in &callbacks {
            callback(progress);
        }
    }

    fn emit_cancelled(&self, key: &TrackKey) {
        self.emit(DownloadEvent::Cancelled { key: key.clone() });
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.inner.events.emit(CoreEvent::Download(event));
    }

    async fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        let data_dir = self.inner.fs.get_data_directory().await?;
        Ok(data_dir.join(relative))
    }

    async fn verify(&self, record: &DownloadRecord) -> Result<bool> {
        let path = self.resolve(&record.local_path).await?;
        if self.inner.fs.exists(&path).await? {
            return Ok(true);
        }

        let key = record.key();
        let file = path.to_string_lossy();
        warn!(%key, file = %strip_path(&file), "Pruning download record without file");
        if let Err(e) = self.inner.records.delete(&key).await {
            warn!(%key, error = %e, "Failed to prune download record");
        }
        Ok(false)
    }
}
