//! Re-entrancy guard for track advancement
//!
//! Completion callbacks, remote commands and UI taps can all request the next
//! track at once. Only one advance may be in flight; concurrent requests are
//! coalesced into the running one. A flag older than the configured timeout
//! is treated as stale and cleared so a hung load cannot block advancing
//! forever.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug)]
pub struct AdvanceGuard {
    in_flight: Mutex<Option<Instant>>,
    timeout: Duration,
}

/// Releases the guard when dropped.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the ticket is dropped"]
pub struct AdvanceTicket<'a> {
    guard: &'a AdvanceGuard,
    acquired_at: Instant,
}

impl AdvanceGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Mutex::new(None),
            timeout,
        }
    }

    /// Claim the guard, or `None` if another advance is running.
    pub fn try_acquire(&self) -> Option<AdvanceTicket<'_>> {
        let mut in_flight = self.in_flight.lock();
        let now = Instant::now();

        if let Some(started) = *in_flight {
            let age = now.saturating_duration_since(started);
            if age < self.timeout {
                return None;
            }
            warn!(?age, "Clearing stale advance guard");
        }

        *in_flight = Some(now);
        Some(AdvanceTicket {
            guard: self,
            acquired_at: now,
        })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.lock().is_some()
    }
}

impl Drop for AdvanceTicket<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.guard.in_flight.lock();
        // A stale ticket must not release a newer holder.
        if *in_flight == Some(self.acquired_at) {
            *in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_is_coalesced() {
        let guard = AdvanceGuard::new(Duration::from_secs(30));
        let ticket = guard.try_acquire();
        assert!(ticket.is_some());
        assert!(guard.try_acquire().is_none());

        drop(ticket);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_flag_is_cleared() {
        let guard = AdvanceGuard::new(Duration::from_secs(30));
        let stale = guard.try_acquire();
        assert!(stale.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = guard.try_acquire();
        assert!(fresh.is_some());

        // Dropping the stale ticket keeps the fresh claim.
        drop(stale);
        assert!(guard.is_held());
        drop(fresh);
        assert!(!guard.is_held());
    }
}
