//! Service façade owning the engine, the download manager and the session store.

use bridge_traits::TrackCatalog;
use core_download::{DownloadConfig, DownloadManager};
use core_playback::{PlaybackConfig, PlaybackEngine, SessionStore};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Builder for [`CoreService`].
///
/// Crate-level tuning defaults to each crate's `Default`; the CDN base URL
/// always comes from the [`CoreConfig`].
pub struct CoreServiceBuilder {
    config: CoreConfig,
    playback: PlaybackConfig,
    download: DownloadConfig,
    event_capacity: usize,
}

impl CoreServiceBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            playback: PlaybackConfig::default(),
            download: DownloadConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_playback_config(mut self, config: PlaybackConfig) -> Self {
        self.playback = config;
        self
    }

    pub fn with_download_config(mut self, config: DownloadConfig) -> Self {
        self.download = config;
        self
    }

    /// Events buffered per subscriber before it lags.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Construct the components and start the background watchers.
    pub async fn build(self) -> Result<CoreService> {
        let Self {
            config,
            playback,
            download,
            event_capacity,
        } = self;

        let events = EventBus::new(event_capacity.max(1));
        let autosave_interval = playback.autosave_interval;
        let session_max_age = playback.session_max_age;

        let engine = PlaybackEngine::new(
            playback,
            config.catalog.clone(),
            config.clock.clone(),
            events.clone(),
        )?;
        if let Some(output) = &config.audio_output {
            engine.attach_output(output.clone()).await?;
        }

        let downloads = DownloadManager::new(
            download.with_cdn_base_url(config.cdn_base_url.clone()),
            config.download_records.clone(),
            config.file_system.clone(),
            config.transfer_client.clone(),
            config.clock.clone(),
            events.clone(),
        )?;

        let sessions = SessionStore::new(
            config.metadata_store.clone(),
            config.clock.clone(),
            session_max_age,
        );

        let mut tasks = Vec::new();
        if let Some(monitor) = &config.network_monitor {
            match engine.watch_network(monitor.clone()).await {
                Ok(handle) => tasks.push(handle),
                Err(e) => warn!(error = %e, "Network monitoring unavailable"),
            }
        }
        if let Some(observer) = &config.lifecycle_observer {
            match engine.watch_lifecycle(observer.clone()).await {
                Ok(handle) => tasks.push(handle),
                Err(e) => warn!(error = %e, "Lifecycle observation unavailable"),
            }
        }
        tasks.push(sessions.spawn_autosave(engine.clone(), &events, autosave_interval));

        info!(data_dir = ?config.data_dir, "Core service started");

        Ok(CoreService {
            inner: Arc::new(ServiceInner {
                config,
                events,
                engine,
                downloads,
                sessions,
                tasks: Mutex::new(tasks),
            }),
        })
    }
}

struct ServiceInner {
    config: CoreConfig,
    events: EventBus,
    engine: PlaybackEngine,
    downloads: DownloadManager,
    sessions: SessionStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Primary façade exposed to host applications.
///
/// Cheap to clone; clones share the same engine and download manager.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Build a service with default tuning.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        CoreServiceBuilder::new(config).build().await
    }

    pub fn builder(config: CoreConfig) -> CoreServiceBuilder {
        CoreServiceBuilder::new(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.inner.engine
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.inner.downloads
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn catalog(&self) -> Arc<dyn TrackCatalog> {
        self.inner.config.catalog.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Subscribe to playback and download events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    /// Restore the saved session, loading its track paused.
    ///
    /// Returns `false` when nothing was restored. A session whose track is
    /// gone from the catalog or cannot be played is discarded and the app
    /// starts fresh. Other failures, such as a missing audio output, are
    /// returned and the saved session is kept for a later attempt.
    pub async fn restore_session(&self) -> Result<bool> {
        let Some(snapshot) = self.inner.sessions.load_snapshot().await else {
            debug!("No saved session");
            return Ok(false);
        };
        let had_track = snapshot.current.is_some();

        match self.inner.engine.restore(snapshot).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                if had_track {
                    self.discard_session().await;
                }
                Ok(false)
            }
            Err(e) if e.invalidates_session() => {
                warn!(error = %e, "Saved session cannot be restored, starting fresh");
                self.discard_session().await;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn discard_session(&self) {
        if let Err(e) = self.inner.sessions.clear_snapshot().await {
            warn!(error = %e, "Failed to discard saved session");
        }
    }

    /// Persist the current playback session now.
    pub async fn save_session(&self) -> Result<()> {
        let snapshot = self.inner.engine.snapshot().await;
        self.inner.sessions.save_snapshot(&snapshot).await?;
        Ok(())
    }

    /// Save the session, stop background tasks and cancel transfers.
    pub async fn shutdown(&self) {
        if self.inner.engine.state().current.is_some() {
            if let Err(e) = self.save_session().await {
                warn!(error = %e, "Failed to save session on shutdown");
            }
        }

        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        self.inner.downloads.shutdown().await;
        info!("Core service stopped");
    }
}
