//! Application Lifecycle Notifications
//!
//! The playback engine re-checks the sleep timer deadline when the app
//! returns to the foreground.

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Application is in the foreground and active
    Foreground,
    /// Application is in the background
    Background,
    /// Application is being suspended
    Suspended,
}

impl LifecycleState {
    pub fn is_foreground(self) -> bool {
        matches!(self, LifecycleState::Foreground)
    }
}

/// Lifecycle observer trait
///
/// # Platform Support
///
/// - **iOS**: UIApplication lifecycle notifications
/// - **Android**: Activity/Application lifecycle callbacks
/// - **Desktop**: Window focus/minimize events (less critical)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lifecycle::{LifecycleObserver, LifecycleState};
///
/// async fn on_resume(observer: &dyn LifecycleObserver, engine: &PlaybackEngine) -> Result<()> {
///     let mut stream = observer.subscribe_changes().await?;
///     while let Some(state) = stream.next().await {
///         if state == LifecycleState::Foreground {
///             engine.on_foreground().await?;
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Get current lifecycle state
    async fn get_state(&self) -> Result<LifecycleState>;

    /// Subscribe to lifecycle state changes
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle state changes
#[async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle state update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleState>;
}
