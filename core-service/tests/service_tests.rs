//! End-to-end tests of the service façade over the desktop library store

use async_trait::async_trait;
use bridge_desktop::{SqliteLibraryStore, TokioFileSystem};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioOutput, AudioOutputEvent, AudioOutputEventStream, AudioSource, MetadataStore,
    NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType,
    PlaybackMetadata, Reciter, Surah, TrackCatalog, TrackKey, TransferClient, TransferEvent,
    TransferHandle, TransferRequest,
};
use core_playback::{
    PlayOptions, PlaybackError, PlaybackMode, PlaybackStatus, SessionSnapshot, SESSION_KEY,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, DownloadEvent};
use core_service::{CoreError, CoreService};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const RECITER: &str = "sudais";

// ============================================================================
// Fakes
// ============================================================================

struct FixedNetwork {
    offline: bool,
}

struct NoChanges;

#[async_trait]
impl NetworkChangeStream for NoChanges {
    async fn next(&mut self) -> Option<NetworkInfo> {
        std::future::pending::<()>().await;
        None
    }
}

#[async_trait]
impl NetworkMonitor for FixedNetwork {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        if self.offline {
            return Ok(NetworkInfo::offline());
        }
        Ok(NetworkInfo {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::WiFi),
            is_metered: false,
            is_expensive: false,
        })
    }

    async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(NoChanges))
    }
}

#[derive(Default)]
struct SilentOutput {
    plays: AtomicUsize,
    loads: Mutex<Vec<AudioSource>>,
    sender: Mutex<Option<mpsc::UnboundedSender<AudioOutputEvent>>>,
}

struct ChannelStream(mpsc::UnboundedReceiver<AudioOutputEvent>);

#[async_trait]
impl AudioOutputEventStream for ChannelStream {
    async fn next(&mut self) -> Option<AudioOutputEvent> {
        self.0.recv().await
    }
}

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn load(&self, source: AudioSource, _metadata: PlaybackMetadata) -> BridgeResult<()> {
        self.loads.lock().unwrap().push(source);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&self, _position: Duration) -> BridgeResult<()> {
        Ok(())
    }

    async fn set_volume(&self, _volume: f32) -> BridgeResult<()> {
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(Duration::from_secs(42))
    }

    async fn subscribe_events(&self) -> BridgeResult<Box<dyn AudioOutputEventStream>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(Box::new(ChannelStream(rx)))
    }
}

/// Writes the whole file on start and completes immediately.
struct InstantTransfer;

struct FinishedHandle(VecDeque<TransferEvent>);

#[async_trait]
impl TransferHandle for FinishedHandle {
    async fn next_event(&mut self) -> Option<BridgeResult<TransferEvent>> {
        self.0.pop_front().map(Ok)
    }

    async fn pause(&mut self) -> BridgeResult<()> {
        self.0.clear();
        Ok(())
    }
}

#[async_trait]
impl TransferClient for InstantTransfer {
    async fn start(&self, request: TransferRequest) -> BridgeResult<Box<dyn TransferHandle>> {
        let body = b"recitation audio".to_vec();
        if let Some(parent) = request.destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.destination, &body)?;

        let total = body.len() as u64;
        Ok(Box::new(FinishedHandle(VecDeque::from([
            TransferEvent::Progress {
                downloaded_bytes: total,
                total_bytes: Some(total),
            },
            TransferEvent::Completed { total_bytes: total },
        ]))))
    }
}

// ============================================================================
// Harness
// ============================================================================

async fn library(temp: &TempDir) -> Arc<SqliteLibraryStore> {
    let store = SqliteLibraryStore::in_memory(temp.path()).await.unwrap();
    store
        .upsert_reciter(&Reciter {
            id: RECITER.to_string(),
            name_en: "Abdul Rahman Al-Sudais".to_string(),
            name_ar: "عبد الرحمن السديس".to_string(),
            color_primary: "#0B3D2E".to_string(),
            color_secondary: "#F1E3C8".to_string(),
        })
        .await
        .unwrap();
    store
        .upsert_surahs(
            &[(1, "Al-Fatihah"), (2, "Al-Baqarah"), (3, "Ali 'Imran")]
                .map(|(number, name)| Surah {
                    number,
                    name_ar: String::new(),
                    name_en: name.to_string(),
                }),
        )
        .await
        .unwrap();
    Arc::new(store)
}

async fn service(
    temp: &TempDir,
    store: Arc<SqliteLibraryStore>,
    output: Arc<SilentOutput>,
    offline: bool,
) -> CoreService {
    build_service(temp, store, Some(output), offline).await
}

async fn build_service(
    temp: &TempDir,
    store: Arc<SqliteLibraryStore>,
    output: Option<Arc<SilentOutput>>,
    offline: bool,
) -> CoreService {
    let mut builder = CoreConfig::builder()
        .database_path(temp.path().join("qariee.db"))
        .data_dir(temp.path())
        .cdn_base_url("https://cdn.test")
        .library_store(store)
        .file_system(Arc::new(TokioFileSystem::with_data_dir(temp.path())))
        .transfer_client(Arc::new(InstantTransfer))
        .network_monitor(Arc::new(FixedNetwork { offline }));
    if let Some(output) = output {
        builder = builder.audio_output(output);
    }

    CoreService::new(builder.build().unwrap()).await.unwrap()
}

fn saved_session(current: u32, mode: PlaybackMode, history: &[u32]) -> SessionSnapshot {
    SessionSnapshot {
        current: Some(TrackKey::new(RECITER, current)),
        position_ms: 5_000,
        mode,
        queue: (1..=3).map(|item| TrackKey::new(RECITER, item)).collect(),
        play_history: history
            .iter()
            .map(|item| TrackKey::new(RECITER, *item))
            .collect(),
        saved_at: chrono::Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_session_survives_restart() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;

    let first = service(&temp, store.clone(), Arc::new(SilentOutput::default()), false).await;
    let tracks = store.get_all_tracks_for(RECITER).await.unwrap();
    first
        .playback()
        .play(tracks[1].clone(), tracks.clone(), PlayOptions::default())
        .await
        .unwrap();
    first.playback().set_playback_mode(PlaybackMode::Repeat).await;
    first.shutdown().await;

    let output = Arc::new(SilentOutput::default());
    let second = service(&temp, store.clone(), output.clone(), false).await;
    assert!(second.restore_session().await.unwrap());

    let state = second.playback().state();
    assert_eq!(state.current_key(), Some(&TrackKey::new(RECITER, 2)));
    assert_eq!(state.mode, PlaybackMode::Repeat);
    assert_eq!(state.status, PlaybackStatus::Paused);
    assert_eq!(output.plays.load(Ordering::SeqCst), 0);
    assert_eq!(
        output.loads.lock().unwrap().as_slice(),
        &[AudioSource::RemoteStream {
            url: "https://cdn.test/audio/sudais/002.mp3".to_string()
        }]
    );
}

#[tokio::test]
async fn test_restore_without_session() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;
    let core = service(&temp, store, Arc::new(SilentOutput::default()), false).await;

    assert!(!core.restore_session().await.unwrap());
    assert!(core.playback().state().current.is_none());
}

#[tokio::test]
async fn test_restore_before_output_keeps_session() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;
    let core = build_service(&temp, store.clone(), None, false).await;
    core.sessions()
        .save_snapshot(&saved_session(2, PlaybackMode::Shuffle, &[1]))
        .await
        .unwrap();

    let err = core.restore_session().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Playback(PlaybackError::NotInitialized)
    ));
    assert!(store.get(SESSION_KEY).await.unwrap().is_some());

    // Engine untouched by the failed attempt.
    let state = core.playback().state();
    assert!(state.current.is_none());
    assert_eq!(state.mode, PlaybackMode::Sequential);
    assert_eq!(state.play_history_len, 0);

    let output = Arc::new(SilentOutput::default());
    core.playback().attach_output(output.clone()).await.unwrap();
    assert!(core.restore_session().await.unwrap());

    let state = core.playback().state();
    assert_eq!(state.current_key(), Some(&TrackKey::new(RECITER, 2)));
    assert_eq!(state.mode, PlaybackMode::Shuffle);
    assert_eq!(state.play_history_len, 1);
    assert_eq!(state.status, PlaybackStatus::Paused);
    assert_eq!(output.plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_session_for_removed_track_is_discarded() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;
    let core = service(&temp, store.clone(), Arc::new(SilentOutput::default()), false).await;
    core.sessions()
        .save_snapshot(&saved_session(99, PlaybackMode::Sequential, &[]))
        .await
        .unwrap();

    assert!(!core.restore_session().await.unwrap());
    assert_eq!(store.get(SESSION_KEY).await.unwrap(), None);
    assert!(core.playback().state().current.is_none());
}

#[tokio::test]
async fn test_offline_restore_of_streamed_track_starts_fresh() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;
    let core = service(&temp, store.clone(), Arc::new(SilentOutput::default()), true).await;
    assert!(core.playback().is_offline());

    let key = TrackKey::new(RECITER, 1);
    core.sessions()
        .save_snapshot(&SessionSnapshot {
            current: Some(key.clone()),
            position_ms: 10_000,
            mode: PlaybackMode::Sequential,
            queue: vec![key],
            play_history: vec![],
            saved_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    assert!(!core.restore_session().await.unwrap());
    assert!(core.playback().state().current.is_none());
    assert_eq!(store.get(SESSION_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn test_downloaded_track_becomes_local() {
    let temp = tempfile::tempdir().unwrap();
    let store = library(&temp).await;
    let core = service(&temp, store.clone(), Arc::new(SilentOutput::default()), false).await;
    let mut events = core.subscribe();

    core.downloads().download_track(RECITER, 3, None).await.unwrap();
    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CoreEvent::Download(DownloadEvent::Completed { key, .. })) =
                events.recv().await
            {
                break key;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, TrackKey::new(RECITER, 3));

    let tracks = store.get_all_tracks_for(RECITER).await.unwrap();
    assert!(tracks[2].is_local);
    assert!(!tracks[0].is_local);
    assert!(core.downloads().get_storage_used().await > 0);

    core.downloads().delete_download(RECITER, 3).await.unwrap();
    assert!(!store.is_locally_available(&tracks[2].key).await.unwrap());
}

#[tokio::test]
async fn test_missing_catalog_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let err = CoreConfig::builder()
        .database_path(temp.path().join("qariee.db"))
        .data_dir(temp.path())
        .build()
        .unwrap_err();

    match CoreError::from(err) {
        CoreError::CapabilityMissing { capability, .. } => assert_eq!(capability, "TrackCatalog"),
        other => panic!("unexpected error {other:?}"),
    }
}
