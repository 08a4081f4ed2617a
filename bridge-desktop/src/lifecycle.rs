//! Lifecycle Observer Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    lifecycle::{LifecycleChangeStream, LifecycleObserver, LifecycleState},
};
use tokio::sync::watch;
use tracing::debug;

/// Desktop lifecycle observer.
///
/// Desktop apps start in the foreground. The host shell reports window
/// minimize/restore through [`DesktopLifecycleObserver::set_state`].
pub struct DesktopLifecycleObserver {
    state: watch::Sender<LifecycleState>,
}

impl DesktopLifecycleObserver {
    /// Create a new lifecycle observer.
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Foreground);
        Self { state }
    }

    /// Record a lifecycle transition. Repeating the current state is ignored.
    pub fn set_state(&self, next: LifecycleState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = ?next, "Lifecycle state changed");
        }
    }
}

impl Default for DesktopLifecycleObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleObserver for DesktopLifecycleObserver {
    async fn get_state(&self) -> Result<LifecycleState> {
        Ok(*self.state.borrow())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>> {
        Ok(Box::new(DesktopLifecycleChangeStream {
            receiver: self.state.subscribe(),
        }))
    }
}

struct DesktopLifecycleChangeStream {
    receiver: watch::Receiver<LifecycleState>,
}

#[async_trait]
impl LifecycleChangeStream for DesktopLifecycleChangeStream {
    async fn next(&mut self) -> Option<LifecycleState> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_starts_in_foreground() {
        let observer = DesktopLifecycleObserver::new();
        assert_eq!(observer.get_state().await.unwrap(), LifecycleState::Foreground);
    }

    #[tokio::test]
    async fn test_transitions_are_streamed() {
        let observer = DesktopLifecycleObserver::new();
        let mut changes = observer.subscribe_changes().await.unwrap();

        observer.set_state(LifecycleState::Background);
        assert_eq!(changes.next().await, Some(LifecycleState::Background));

        // Same state again is not a transition.
        observer.set_state(LifecycleState::Background);
        observer.set_state(LifecycleState::Foreground);
        assert_eq!(changes.next().await, Some(LifecycleState::Foreground));
        assert!(
            tokio::time::timeout(Duration::from_millis(20), changes.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_stream_ends_with_observer() {
        let observer = DesktopLifecycleObserver::new();
        let mut changes = observer.subscribe_changes().await.unwrap();
        drop(observer);
        assert_eq!(changes.next().await, None);
    }
}
