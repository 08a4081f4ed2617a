//! # Session Persistence
//!
//! Saves the playback session as JSON under a single metadata key so the
//! host can resume where the listener left off. Loading is forgiving: a
//! missing, unreadable, corrupt or expired snapshot yields `None` and the
//! app starts fresh.

use bridge_traits::{Clock, MetadataStore};
use core_runtime::events::{CoreEvent, EventBus, EventStream, RecvError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::PlaybackEngine;
use crate::error::Result;
use crate::types::SessionSnapshot;

/// Metadata key holding the serialized session.
pub const SESSION_KEY: &str = "playback_session";

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn MetadataStore>, clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            store,
            clock,
            max_age,
        }
    }

    pub async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set(SESSION_KEY, &json).await?;
        debug!(current = ?snapshot.current, position_ms = snapshot.position_ms, "Session saved");
        Ok(())
    }

    /// Load the saved session, discarding it when corrupt or expired.
    pub async fn load_snapshot(&self) -> Option<SessionSnapshot> {
        let json = match self.store.get(SESSION_KEY).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read saved session");
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Discarding corrupt saved session");
                self.discard().await;
                return None;
            }
        };

        let age = self.clock.now() - snapshot.saved_at;
        let expired = age
            .to_std()
            .map(|age| age > self.max_age)
            .unwrap_or(false);
        if expired {
            info!(saved_at = %snapshot.saved_at, "Discarding expired saved session");
            self.discard().await;
            return None;
        }

        Some(snapshot)
    }

    pub async fn clear_snapshot(&self) -> Result<()> {
        self.store.delete(SESSION_KEY).await?;
        Ok(())
    }

    async fn discard(&self) {
        if let Err(e) = self.store.delete(SESSION_KEY).await {
            warn!(error = %e, "Failed to delete saved session");
        }
    }

    async fn save_from(&self, engine: &PlaybackEngine) {
        let snapshot = engine.snapshot().await;
        if snapshot.current.is_none() {
            return;
        }
        if let Err(e) = self.save_snapshot(&snapshot).await {
            warn!(error = %e, "Autosave failed");
        }
    }

    /// Save on every playback notification and on each `interval` tick
    /// while playing.
    ///
    /// Runs until the event bus closes or the handle is aborted.
    pub fn spawn_autosave(
        &self,
        engine: PlaybackEngine,
        events: &EventBus,
        interval: Duration,
    ) -> JoinHandle<()> {
        let sessions = self.clone();
        let mut playback = EventStream::new(events.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    event = playback.recv() => match event {
                        Ok(_) => sessions.save_from(&engine).await,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Autosave lagged behind playback events");
                            sessions.save_from(&engine).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {
                        if engine.state().status.is_playing() {
                            sessions.save_from(&engine).await;
                        }
                    }
                }
            }
            debug!("Autosave stopped");
        })
    }
}
