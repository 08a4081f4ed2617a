//! Sleep timer bookkeeping
//!
//! The timer stores an absolute wall-clock deadline rather than a countdown,
//! so a deadline that passed while the process was suspended is detected on
//! the next foreground check. Each arm gets a fresh generation id; a firing
//! task only acts if its id is still the armed one.
//!
//! A timer stays armed while it fades out, so cancelling or replacing it
//! during the fade aborts the fading task before it pauses playback.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Invoked once when the timer pauses playback.
pub type ExpireCallback = Arc<dyn Fn() + Send + Sync>;

struct ArmedTimer {
    id: u64,
    ends_at: DateTime<Utc>,
    task: Option<JoinHandle<()>>,
    on_expire: Option<ExpireCallback>,
    fading: bool,
}

/// A timer that was disarmed, either by expiry or cancellation.
pub struct Disarmed {
    pub ends_at: DateTime<Utc>,
    pub on_expire: Option<ExpireCallback>,
    /// The timer was interrupted mid-fade; volume is not at full.
    pub fading: bool,
}

impl fmt::Debug for Disarmed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disarmed")
            .field("ends_at", &self.ends_at)
            .field("has_callback", &self.on_expire.is_some())
            .field("fading", &self.fading)
            .finish()
    }
}

#[derive(Default)]
pub struct SleepTimer {
    armed: Mutex<Option<ArmedTimer>>,
    next_id: AtomicU64,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next [`arm`](Self::arm).
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Install a timer, replacing (and aborting) any armed one.
    pub fn arm(
        &self,
        id: u64,
        ends_at: DateTime<Utc>,
        task: JoinHandle<()>,
        on_expire: Option<ExpireCallback>,
    ) -> Option<Disarmed> {
        let previous = self.armed.lock().replace(ArmedTimer {
            id,
            ends_at,
            task: Some(task),
            on_expire,
            fading: false,
        });
        previous.map(Self::abort)
    }

    /// Mark generation `id` as fading out. Returns `false` if it is no
    /// longer the armed timer.
    pub fn begin_fade(&self, id: u64) -> bool {
        match self.armed.lock().as_mut() {
            Some(timer) if timer.id == id => {
                timer.fading = true;
                true
            }
            _ => false,
        }
    }

    /// Disarm the timer if `id` is still the armed generation.
    ///
    /// The task handle is dropped without aborting since the caller is
    /// normally that task.
    pub fn take_if(&self, id: u64) -> Option<Disarmed> {
        let mut armed = self.armed.lock();
        if armed.as_ref().map(|t| t.id) != Some(id) {
            return None;
        }
        armed.take().map(|timer| Disarmed {
            ends_at: timer.ends_at,
            on_expire: timer.on_expire,
            fading: timer.fading,
        })
    }

    /// Disarm whatever timer is armed and abort its task.
    pub fn cancel(&self) -> Option<Disarmed> {
        self.armed.lock().take().map(Self::abort)
    }

    /// Disarm and abort the timer if its deadline is at or before `now`.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Option<Disarmed> {
        let mut armed = self.armed.lock();
        match armed.as_ref() {
            Some(timer) if timer.ends_at <= now => armed.take().map(Self::abort),
            _ => None,
        }
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.armed.lock().as_ref().map(|t| t.ends_at)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    fn abort(timer: ArmedTimer) -> Disarmed {
        if let Some(task) = timer.task {
            task.abort();
        }
        Disarmed {
            ends_at: timer.ends_at,
            on_expire: timer.on_expire,
            fading: timer.fading,
        }
    }
}

impl fmt::Debug for SleepTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepTimer")
            .field("ends_at", &self.ends_at())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn idle_task() -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn test_take_if_ignores_old_generation() {
        let timer = SleepTimer::new();
        let now = Utc::now();

        let first = timer.next_id();
        timer.arm(first, now, idle_task(), None);
        let second = timer.next_id();
        let replaced = timer.arm(second, now, idle_task(), None);
        assert!(replaced.is_some());

        assert!(timer.take_if(first).is_none());
        assert!(timer.is_armed());
        assert!(timer.take_if(second).is_some());
        assert!(!timer.is_armed());
    }

    #[tokio::test]
    async fn test_fading_timer_stays_armed_until_taken() {
        let timer = SleepTimer::new();
        let id = timer.next_id();
        timer.arm(id, Utc::now(), idle_task(), None);

        assert!(!timer.begin_fade(id + 1));
        assert!(timer.begin_fade(id));
        assert!(timer.is_armed());

        let disarmed = timer.cancel().unwrap();
        assert!(disarmed.fading);
        assert!(!timer.begin_fade(id));
        assert!(timer.take_if(id).is_none());
    }

    #[tokio::test]
    async fn test_take_expired_checks_deadline() {
        let timer = SleepTimer::new();
        let now = Utc::now();
        let id = timer.next_id();
        timer.arm(id, now + ChronoDuration::minutes(1), idle_task(), None);

        assert!(timer.take_expired(now).is_none());
        let disarmed = timer.take_expired(now + ChronoDuration::minutes(2));
        assert!(disarmed.is_some());
        assert!(timer.ends_at().is_none());
    }

    #[tokio::test]
    async fn test_cancel_aborts_task() {
        let timer = SleepTimer::new();
        let task = idle_task();
        let handle = task.abort_handle();
        let id = timer.next_id();
        timer.arm(id, Utc::now(), task, None);

        assert!(timer.cancel().is_some());
        for _ in 0..10 {
            if handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(handle.is_finished());
    }
}
