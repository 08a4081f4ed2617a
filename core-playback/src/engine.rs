//! # Playback Queue Engine
//!
//! Decides which track plays next and keeps queue, history and mode state
//! consistent across mode switches, offline transitions and finish events.
//!
//! ## Overview
//!
//! The engine owns no audio pipeline; it drives an [`AudioOutput`] bridge and
//! reacts to its push notifications. All state sits behind one
//! `parking_lot::Mutex` that is never held across an `.await`: catalog
//! lookups and output calls happen between short critical sections.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = PlaybackEngine::new(PlaybackConfig::default(), catalog, clock, bus)?;
//! engine.attach_output(output).await?;
//! engine.play(track, queue, PlayOptions::default()).await?;
//! engine.set_playback_mode(PlaybackMode::Shuffle).await;
//! ```

use bridge_traits::{
    AudioOutput, AudioOutputEvent, AudioSource, Clock, LifecycleObserver, NetworkMonitor,
    OutputState, PlaybackMetadata, Track, TrackCatalog, TrackKey,
};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, PlaybackMode, PlaybackStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::guard::AdvanceGuard;
use crate::history::PlayHistory;
use crate::queue::PlaybackQueue;
use crate::shuffle::{shuffle_with_history, ShuffleHistory};
use crate::sleep_timer::{Disarmed, ExpireCallback, SleepTimer};
use crate::types::{PlayOptions, PlaybackStateSnapshot, SessionSnapshot};

const FULL_VOLUME: f32 = 1.0;

// ============================================================================
// State
// ============================================================================

struct EngineState {
    current: Option<Track>,
    queue: PlaybackQueue,
    mode: PlaybackMode,
    status: PlaybackStatus,
    played: HashSet<TrackKey>,
    shuffle_history: ShuffleHistory,
    play_history: PlayHistory,
}

impl EngineState {
    fn new(shuffle_history_size: usize) -> Self {
        Self {
            current: None,
            queue: PlaybackQueue::new(),
            mode: PlaybackMode::default(),
            status: PlaybackStatus::Idle,
            played: HashSet::new(),
            shuffle_history: ShuffleHistory::new(shuffle_history_size),
            play_history: PlayHistory::new(),
        }
    }

    fn reset_session(&mut self) {
        self.played.clear();
        self.shuffle_history.clear();
        self.play_history.clear();
    }

    fn current_key(&self) -> Option<TrackKey> {
        self.current.as_ref().map(|t| t.key.clone())
    }

    /// Move the outgoing track into the histories.
    ///
    /// Tracks that never managed to play are left out.
    fn retire(&mut self, track: Track) {
        if self.status == PlaybackStatus::Failed {
            return;
        }
        if self.mode == PlaybackMode::Shuffle {
            self.shuffle_history.push(track.key.clone());
        }
        self.play_history.push(track);
    }

    /// Order rebuild candidates for the current mode.
    fn order(&mut self, candidates: Vec<Track>) -> Vec<Track> {
        match self.mode {
            PlaybackMode::Shuffle => shuffle_with_history(candidates, &mut self.shuffle_history),
            PlaybackMode::Sequential | PlaybackMode::Repeat => candidates,
        }
    }

    fn state_event(&self) -> PlaybackEvent {
        PlaybackEvent::StateChanged {
            current: self.current_key(),
            queue: self.queue.active_keys(),
            status: self.status,
            mode: self.mode,
        }
    }
}

struct Inner {
    config: PlaybackConfig,
    catalog: Arc<dyn TrackCatalog>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    output: RwLock<Option<Arc<dyn AudioOutput>>>,
    output_listener: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<EngineState>,
    guard: AdvanceGuard,
    sleep_timer: SleepTimer,
    offline: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.output_listener.get_mut().take() {
            listener.abort();
        }
        self.sleep_timer.cancel();
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Playback queue engine.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<Inner>,
}

impl PlaybackEngine {
    pub fn new(
        config: PlaybackConfig,
        catalog: Arc<dyn TrackCatalog>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        let state = EngineState::new(config.shuffle_history_size);
        let guard = AdvanceGuard::new(config.advance_guard_timeout);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                clock,
                events,
                output: RwLock::new(None),
                output_listener: Mutex::new(None),
                state: Mutex::new(state),
                guard,
                sleep_timer: SleepTimer::new(),
                offline: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Output wiring
    // ------------------------------------------------------------------------

    /// Attach the audio output and start listening to its notifications.
    ///
    /// Replaces any previously attached output.
    pub async fn attach_output(&self, output: Arc<dyn AudioOutput>) -> Result<()> {
        let mut stream = output.subscribe_events().await?;
        *self.inner.output.write() = Some(output);

        let weak = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PlaybackEngine { inner }.handle_output_event(event).await;
            }
            debug!("Audio output event stream closed");
        });

        if let Some(previous) = self.inner.output_listener.lock().replace(listener) {
            previous.abort();
        }

        info!("Audio output attached");
        Ok(())
    }

    fn output(&self) -> Result<Arc<dyn AudioOutput>> {
        self.attached_output().ok_or(PlaybackError::NotInitialized)
    }

    fn attached_output(&self) -> Option<Arc<dyn AudioOutput>> {
        self.inner.output.read().clone()
    }

    async fn handle_output_event(&self, event: AudioOutputEvent) {
        match event {
            AudioOutputEvent::Finished => {
                debug!("Track finished");
                self.set_status(PlaybackStatus::Finished);
                if let Err(e) = self.play_next().await {
                    warn!(error = %e, "Auto-advance after finish failed");
                }
            }
            AudioOutputEvent::Error { message } => {
                let key = self.inner.state.lock().current_key();
                warn!(key = ?key, %message, "Audio output reported an error");
                self.set_status(PlaybackStatus::Failed);
                self.emit(PlaybackEvent::Error {
                    key,
                    message,
                    recoverable: true,
                });
                if let Err(e) = self.play_next().await {
                    warn!(error = %e, "Auto-advance after output error failed");
                }
            }
            AudioOutputEvent::StateChanged(state) => {
                let status = match state {
                    OutputState::Playing => PlaybackStatus::Playing,
                    OutputState::Paused => PlaybackStatus::Paused,
                    OutputState::Idle | OutputState::Buffering => return,
                };
                let changed = {
                    let mut st = self.inner.state.lock();
                    let settled = matches!(
                        st.status,
                        PlaybackStatus::Playing | PlaybackStatus::Paused
                    );
                    if st.current.is_some() && settled && st.status != status {
                        st.status = status;
                        true
                    } else {
                        false
                    }
                };
                if changed {
                    self.emit_state();
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------------

    /// Start `track` immediately with `queue` as the upcoming tracks.
    #[instrument(skip(self, track, queue, options), fields(key = %track.key, queue_len = queue.len()))]
    pub async fn play(&self, track: Track, queue: Vec<Track>, options: PlayOptions) -> Result<()> {
        let output = self.output()?;

        if self.is_offline() && !self.inner.catalog.is_locally_available(&track.key).await? {
            let err = PlaybackError::OfflineViolation {
                key: track.key.clone(),
            };
            warn!("Refusing to stream while offline");
            self.emit(PlaybackEvent::Error {
                key: Some(track.key.clone()),
                message: err.to_string(),
                recoverable: false,
            });
            return Err(err);
        }

        let candidates = self.filter_for_connectivity(queue.clone()).await;
        {
            let mut st = self.inner.state.lock();
            if options.continue_session {
                if let Some(previous) = st.current.take() {
                    if previous.key != track.key {
                        st.retire(previous);
                    }
                }
            } else {
                st.reset_session();
            }

            st.queue.set_original(queue);
            st.played.insert(track.key.clone());
            let candidates: Vec<Track> = candidates
                .into_iter()
                .filter(|t| !st.played.contains(&t.key))
                .collect();
            let ordered = st.order(candidates);
            st.queue.rebuild(ordered);
            st.current = Some(track.clone());
            st.status = PlaybackStatus::Loading;
        }

        let result = self
            .start_track(&output, &track, options.start_position, options.start_paused)
            .await;
        if let Err(e) = &result {
            self.fail_current(e);
        }
        result
    }

    /// Advance to the next track according to the playback mode.
    ///
    /// Concurrent calls while an advance is in flight return immediately.
    #[instrument(skip(self))]
    pub async fn play_next(&self) -> Result<()> {
        let Some(_ticket) = self.inner.guard.try_acquire() else {
            debug!("Advance already in flight, coalescing");
            return Ok(());
        };
        self.advance().await
    }

    async fn advance(&self) -> Result<()> {
        let output = self.output()?;

        let looping = {
            let st = self.inner.state.lock();
            if st.mode == PlaybackMode::Repeat {
                st.current.clone()
            } else {
                None
            }
        };
        if let Some(track) = looping {
            return self.restart(&output, &track).await;
        }

        let attempts = self.inner.config.max_skip_attempts;
        for attempt in 1..=attempts {
            let next = {
                let mut st = self.inner.state.lock();
                match st.queue.pop_front() {
                    Some(next) => {
                        if let Some(previous) = st.current.replace(next.clone()) {
                            st.retire(previous);
                        }
                        st.played.insert(next.key.clone());
                        st.status = PlaybackStatus::Loading;
                        Some(next)
                    }
                    None => None,
                }
            };

            let Some(next) = next else {
                return self.end_of_queue(&output).await;
            };

            match self.start_track(&output, &next, None, false).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, key = %next.key, error = %e, "Skipping unplayable track");
                    self.set_status(PlaybackStatus::Failed);
                }
            }
        }

        if let Err(e) = output.pause().await {
            warn!(error = %e, "Failed to pause after exhausting skip attempts");
        }
        let key = {
            let mut st = self.inner.state.lock();
            st.status = PlaybackStatus::Paused;
            st.current_key()
        };

        let err = PlaybackError::AdvanceExhausted { attempts };
        error!(key = ?key, "Giving up on auto-advance");
        self.emit(PlaybackEvent::Error {
            key,
            message: err.to_string(),
            recoverable: false,
        });
        self.emit_state();
        Err(err)
    }

    async fn end_of_queue(&self, output: &Arc<dyn AudioOutput>) -> Result<()> {
        let last = {
            let mut st = self.inner.state.lock();
            let last = st.current.take();
            let key = last.as_ref().map(|t| t.key.clone());
            if let Some(track) = last {
                st.retire(track);
            }
            st.status = PlaybackStatus::Idle;
            key
        };

        if let Err(e) = output.pause().await {
            warn!(error = %e, "Failed to pause at end of queue");
        }

        info!(last = ?last, "Queue ended");
        self.emit(PlaybackEvent::QueueEnded { last });
        self.emit_state();
        Ok(())
    }

    /// Step back to the most recently played track.
    ///
    /// With no history the current track restarts from the beginning.
    #[instrument(skip(self))]
    pub async fn play_previous(&self) -> Result<()> {
        let Some(_ticket) = self.inner.guard.try_acquire() else {
            debug!("Advance already in flight, coalescing");
            return Ok(());
        };
        let output = self.output()?;

        let (previous, current) = {
            let mut st = self.inner.state.lock();
            match st.play_history.pop() {
                Some(previous) => {
                    if let Some(current) = st.current.take() {
                        st.played.remove(&current.key);
                        st.shuffle_history.remove(&current.key);
                        st.queue.push_front(current);
                    }
                    st.played.insert(previous.key.clone());
                    st.current = Some(previous.clone());
                    st.status = PlaybackStatus::Loading;
                    (Some(previous), None)
                }
                None => (None, st.current.clone()),
            }
        };

        match (previous, current) {
            (Some(track), _) => {
                let result = self.start_track(&output, &track, None, false).await;
                if let Err(e) = &result {
                    self.fail_current(e);
                }
                result
            }
            (None, Some(track)) => self.restart(&output, &track).await,
            (None, None) => Ok(()),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let output = self.output()?;
        output.pause().await?;
        {
            let mut st = self.inner.state.lock();
            if st.current.is_some() {
                st.status = PlaybackStatus::Paused;
            }
        }
        self.emit_state();
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let output = self.output()?;
        if self.inner.state.lock().current.is_none() {
            return Ok(());
        }
        output.play().await?;
        self.set_status(PlaybackStatus::Playing);
        self.emit_state();
        Ok(())
    }

    /// Stop playback and drop the queue and histories. The mode is kept.
    pub async fn clear(&self) -> Result<()> {
        if let Some(output) = self.attached_output() {
            output.pause().await?;
        }
        {
            let mut st = self.inner.state.lock();
            st.current = None;
            st.queue.clear();
            st.reset_session();
            st.status = PlaybackStatus::Idle;
        }
        self.emit_state();
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        let st = self.inner.state.lock();
        (st.mode == PlaybackMode::Repeat && st.current.is_some()) || !st.queue.is_empty()
    }

    // ------------------------------------------------------------------------
    // Mode and connectivity
    // ------------------------------------------------------------------------

    pub fn playback_mode(&self) -> PlaybackMode {
        self.inner.state.lock().mode
    }

    /// Switch mode, rebuilding the upcoming queue for Sequential and Shuffle.
    #[instrument(skip(self))]
    pub async fn set_playback_mode(&self, mode: PlaybackMode) {
        let candidates = {
            let mut st = self.inner.state.lock();
            if st.mode == mode {
                return;
            }
            st.mode = mode;
            match mode {
                PlaybackMode::Repeat => None,
                PlaybackMode::Sequential | PlaybackMode::Shuffle => {
                    Some(st.queue.unplayed(&st.played))
                }
            }
        };

        if let Some(candidates) = candidates {
            let candidates = self.filter_for_connectivity(candidates).await;
            let mut st = self.inner.state.lock();
            // A concurrent switch owns the queue now.
            if st.mode == mode {
                let ordered = st.order(candidates);
                st.queue.rebuild(ordered);
            }
        }

        info!(?mode, "Playback mode changed");
        self.emit(PlaybackEvent::ModeChanged { mode });
        self.emit_state();
    }

    /// Re-derive the upcoming queue from the original order minus played
    /// tracks, applying the offline filter when offline.
    #[instrument(skip(self))]
    pub async fn rebuild_queue(&self) {
        let candidates = {
            let st = self.inner.state.lock();
            st.queue.unplayed(&st.played)
        };
        let candidates = self.filter_for_connectivity(candidates).await;
        let remaining = {
            let mut st = self.inner.state.lock();
            let ordered = st.order(candidates);
            st.queue.rebuild(ordered);
            st.queue.len()
        };
        debug!(remaining, "Queue rebuilt");
        self.emit_state();
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Update connectivity.
    ///
    /// Going offline filters the queue down to downloaded tracks. Coming
    /// back online leaves the queue as is until the next `play` or mode
    /// change.
    pub async fn set_offline(&self, offline: bool) {
        if self.inner.offline.swap(offline, Ordering::SeqCst) == offline {
            return;
        }

        info!(offline, "Connectivity changed");
        self.emit(PlaybackEvent::OfflineChanged { offline });
        if offline {
            self.rebuild_queue().await;
        }
    }

    /// Follow a network monitor, applying its current state first.
    pub async fn watch_network(&self, monitor: Arc<dyn NetworkMonitor>) -> Result<JoinHandle<()>> {
        let info = monitor.get_network_info().await?;
        self.set_offline(info.is_offline()).await;

        let mut changes = monitor.subscribe_changes().await?;
        let weak = Arc::downgrade(&self.inner);
        Ok(tokio::spawn(async move {
            while let Some(info) = changes.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PlaybackEngine { inner }.set_offline(info.is_offline()).await;
            }
        }))
    }

    /// Follow app lifecycle changes, running the foreground check on resume.
    pub async fn watch_lifecycle(
        &self,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<JoinHandle<()>> {
        let mut changes = observer.subscribe_changes().await?;
        let weak = Arc::downgrade(&self.inner);
        Ok(tokio::spawn(async move {
            while let Some(state) = changes.next().await {
                if !state.is_foreground() {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PlaybackEngine { inner }.on_foreground().await;
            }
        }))
    }

    /// Re-check wall-clock deadlines after the app returns to the foreground.
    pub async fn on_foreground(&self) {
        let now = self.inner.clock.now();
        if let Some(disarmed) = self.inner.sleep_timer.take_expired(now) {
            info!(ends_at = %disarmed.ends_at, "Sleep timer elapsed while in background");
            self.finish_sleep_timer(disarmed).await;
        }
    }

    // ------------------------------------------------------------------------
    // Sleep timer
    // ------------------------------------------------------------------------

    /// Arm a sleep timer, replacing any existing one. Returns the deadline.
    pub fn set_sleep_timer(
        &self,
        minutes: u32,
        on_expire: Option<ExpireCallback>,
    ) -> Result<DateTime<Utc>> {
        if minutes == 0 {
            return Err(PlaybackError::InvalidArgument(
                "sleep timer needs at least one minute".to_string(),
            ));
        }

        let ends_at = self.inner.clock.now() + chrono::Duration::minutes(i64::from(minutes));
        let delay = self.inner.clock.until(ends_at);
        let id = self.inner.sleep_timer.next_id();

        // A timer replaced mid-fade leaves the volume lowered.
        let interrupted_fade = match self.inner.sleep_timer.cancel() {
            Some(replaced) => {
                debug!(
                    ends_at = %replaced.ends_at,
                    fading = replaced.fading,
                    "Replaced sleep timer"
                );
                replaced.fading
            }
            None => false,
        };

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            if interrupted_fade {
                if let Some(inner) = weak.upgrade() {
                    PlaybackEngine { inner }.reset_volume().await;
                }
            }
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                PlaybackEngine { inner }.fire_sleep_timer(id).await;
            }
        });

        if let Some(raced) = self.inner.sleep_timer.arm(id, ends_at, task, on_expire) {
            debug!(ends_at = %raced.ends_at, "Concurrently armed sleep timer replaced");
        }

        info!(minutes, %ends_at, "Sleep timer set");
        self.emit(PlaybackEvent::SleepTimerSet {
            ends_at_ms: ends_at.timestamp_millis(),
        });
        Ok(ends_at)
    }

    /// Cancel the pending sleep timer and restore full volume.
    ///
    /// A timer that is already fading out is stopped before it pauses.
    pub async fn clear_sleep_timer(&self) {
        let Some(cleared) = self.inner.sleep_timer.cancel() else {
            return;
        };
        self.reset_volume().await;
        info!(fading = cleared.fading, "Sleep timer cleared");
        self.emit(PlaybackEvent::SleepTimerCleared);
    }

    pub fn sleep_timer_remaining(&self) -> Option<Duration> {
        self.inner
            .sleep_timer
            .ends_at()
            .map(|ends_at| self.inner.clock.until(ends_at))
    }

    async fn fire_sleep_timer(&self, id: u64) {
        // Stays armed through the fade so a clear or a new timer can abort it.
        if !self.inner.sleep_timer.begin_fade(id) {
            return;
        }
        if let Some(output) = self.attached_output() {
            let playing = self.inner.state.lock().status.is_playing();
            if playing && self.inner.config.fades() {
                self.fade_out(&output).await;
            }
        }
        if let Some(disarmed) = self.inner.sleep_timer.take_if(id) {
            self.finish_sleep_timer(disarmed).await;
        }
    }

    async fn finish_sleep_timer(&self, disarmed: Disarmed) {
        if let Some(output) = self.attached_output() {
            if let Err(e) = output.pause().await {
                warn!(error = %e, "Sleep timer failed to pause output");
            }
        }
        self.reset_volume().await;

        {
            let mut st = self.inner.state.lock();
            if st.current.is_some() {
                st.status = PlaybackStatus::Paused;
            }
        }

        info!("Sleep timer expired, playback paused");
        self.emit(PlaybackEvent::SleepTimerExpired);
        self.emit_state();

        if let Some(on_expire) = disarmed.on_expire {
            on_expire();
        }
    }

    async fn reset_volume(&self) {
        if let Some(output) = self.attached_output() {
            if let Err(e) = output.set_volume(FULL_VOLUME).await {
                warn!(error = %e, "Failed to reset volume");
            }
        }
    }

    async fn fade_out(&self, output: &Arc<dyn AudioOutput>) {
        let steps = self.inner.config.fade_steps;
        let interval = self.inner.config.fade_duration / steps;
        for step in 1..=steps {
            let volume = FULL_VOLUME * (1.0 - step as f32 / steps as f32);
            if let Err(e) = output.set_volume(volume).await {
                warn!(error = %e, "Fade aborted");
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn state(&self) -> PlaybackStateSnapshot {
        let sleep_timer_remaining = self.sleep_timer_remaining();
        let st = self.inner.state.lock();
        PlaybackStateSnapshot {
            current: st.current.clone(),
            queue: st.queue.active().cloned().collect(),
            mode: st.mode,
            status: st.status,
            offline: self.is_offline(),
            shuffle_history: st.shuffle_history.keys(),
            play_history_len: st.play_history.len(),
            sleep_timer_remaining,
        }
    }

    /// Capture the session for persistence.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let has_current = self.inner.state.lock().current.is_some();
        let position = match self.attached_output() {
            Some(output) if has_current => output.position().await.unwrap_or_else(|e| {
                debug!(error = %e, "Position unavailable for snapshot");
                Duration::ZERO
            }),
            _ => Duration::ZERO,
        };

        let st = self.inner.state.lock();
        SessionSnapshot {
            current: st.current_key(),
            position_ms: u64::try_from(position.as_millis()).unwrap_or(u64::MAX),
            mode: st.mode,
            queue: st.queue.original().iter().map(|t| t.key.clone()).collect(),
            play_history: st.play_history.keys(),
            saved_at: self.inner.clock.now(),
        }
    }

    /// Restore a saved session, loading the current track paused.
    ///
    /// Returns `false` when there is nothing to restore. Engine state is left
    /// untouched unless the saved track can be loaded.
    #[instrument(skip(self, snapshot), fields(current = ?snapshot.current))]
    pub async fn restore(&self, snapshot: SessionSnapshot) -> Result<bool> {
        let Some(current_key) = snapshot.current.as_ref() else {
            return Ok(false);
        };
        self.output()?;

        let mut resolver = TrackResolver::new(self.inner.catalog.as_ref());
        let Some(current) = resolver.resolve(current_key).await? else {
            warn!("Saved track is no longer in the catalog");
            return Ok(false);
        };
        if self.is_offline() && !self.inner.catalog.is_locally_available(&current.key).await? {
            return Err(PlaybackError::OfflineViolation { key: current.key });
        }
        let queue = resolver.resolve_all(&snapshot.queue).await?;
        let history = resolver.resolve_all(&snapshot.play_history).await?;

        {
            let mut st = self.inner.state.lock();
            st.mode = snapshot.mode;
            st.current = None;
            st.reset_session();
            st.played = history.iter().map(|t| t.key.clone()).collect();
            st.play_history = history.into_iter().collect();
        }

        let mut options = PlayOptions::default().continue_session().paused();
        if snapshot.position_ms > 0 {
            options = options.start_at(snapshot.position());
        }
        self.play(current, queue, options).await?;

        info!(position_ms = snapshot.position_ms, "Session restored");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn start_track(
        &self,
        output: &Arc<dyn AudioOutput>,
        track: &Track,
        start_position: Option<Duration>,
        start_paused: bool,
    ) -> Result<()> {
        let (source, is_local) = self.resolve_source(track).await?;
        let metadata = PlaybackMetadata {
            track_id: Some(track.key.to_string()),
            title: Some(track.name.clone()),
            artist: Some(track.collection_id().to_string()),
            ..Default::default()
        };

        output
            .load(source, metadata)
            .await
            .map_err(|e| PlaybackError::SourceUnavailable(format!("{}: {}", track.key, e)))?;

        if let Some(position) = start_position {
            output.seek(position).await?;
        }

        let status = if start_paused {
            PlaybackStatus::Paused
        } else {
            output
                .play()
                .await
                .map_err(|e| PlaybackError::SourceUnavailable(format!("{}: {}", track.key, e)))?;
            PlaybackStatus::Playing
        };

        {
            let mut st = self.inner.state.lock();
            if st.current.as_ref().map(|t| &t.key) == Some(&track.key) {
                st.status = status;
            }
        }

        info!(key = %track.key, is_local, "Track started");
        self.emit(PlaybackEvent::TrackStarted {
            key: track.key.clone(),
            is_local,
        });
        self.emit_state();
        Ok(())
    }

    /// Prefer the downloaded file, fall back to the remote stream.
    async fn resolve_source(&self, track: &Track) -> Result<(AudioSource, bool)> {
        match self.inner.catalog.local_path_for(&track.key).await {
            Ok(Some(path)) => return Ok((AudioSource::LocalFile { path }, true)),
            Ok(None) => {}
            Err(e) => warn!(key = %track.key, error = %e, "Local path lookup failed"),
        }

        match &track.source {
            AudioSource::RemoteStream { .. } if self.is_offline() => {
                Err(PlaybackError::OfflineViolation {
                    key: track.key.clone(),
                })
            }
            AudioSource::RemoteStream { .. } => Ok((track.source.clone(), false)),
            AudioSource::LocalFile { path } => Err(PlaybackError::SourceUnavailable(format!(
                "{}: local file {} is missing",
                track.key,
                path.display()
            ))),
        }
    }

    async fn restart(&self, output: &Arc<dyn AudioOutput>, track: &Track) -> Result<()> {
        output.seek(Duration::ZERO).await?;
        output.play().await?;
        self.set_status(PlaybackStatus::Playing);
        debug!(key = %track.key, "Restarted current track");
        self.emit_state();
        Ok(())
    }

    async fn filter_for_connectivity(&self, tracks: Vec<Track>) -> Vec<Track> {
        if !self.is_offline() {
            return tracks;
        }

        let mut available = Vec::with_capacity(tracks.len());
        for track in tracks {
            match self.inner.catalog.is_locally_available(&track.key).await {
                Ok(true) => available.push(track),
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %track.key, error = %e, "Availability check failed, dropping track")
                }
            }
        }
        available
    }

    fn fail_current(&self, err: &PlaybackError) {
        let key = {
            let mut st = self.inner.state.lock();
            st.status = PlaybackStatus::Failed;
            st.current_key()
        };
        self.emit(PlaybackEvent::Error {
            key,
            message: err.to_string(),
            recoverable: err.is_skippable(),
        });
        self.emit_state();
    }

    fn set_status(&self, status: PlaybackStatus) {
        self.inner.state.lock().status = status;
    }

    fn emit_state(&self) {
        let event = self.inner.state.lock().state_event();
        self.emit(event);
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.emit(CoreEvent::Playback(event));
    }
}

/// Resolves keys to catalog tracks, loading each collection once.
struct TrackResolver<'a> {
    catalog: &'a dyn TrackCatalog,
    by_collection: HashMap<String, Vec<Track>>,
}

impl<'a> TrackResolver<'a> {
    fn new(catalog: &'a dyn TrackCatalog) -> Self {
        Self {
            catalog,
            by_collection: HashMap::new(),
        }
    }

    async fn resolve(&mut self, key: &TrackKey) -> Result<Option<Track>> {
        if !self.by_collection.contains_key(&key.collection_id) {
            let tracks = self.catalog.get_all_tracks_for(&key.collection_id).await?;
            self.by_collection.insert(key.collection_id.clone(), tracks);
        }
        Ok(self
            .by_collection
            .get(&key.collection_id)
            .and_then(|tracks| tracks.iter().find(|t| &t.key == key))
            .cloned())
    }

    async fn resolve_all(&mut self, keys: &[TrackKey]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(keys.len());
        for key in keys {
            match self.resolve(key).await? {
                Some(track) => tracks.push(track),
                None => debug!(%key, "Dropping unknown track from saved session"),
            }
        }
        Ok(tracks)
    }
}
