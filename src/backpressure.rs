//! Backpressure for the outbound queue.
//!
//! Tracks frames handed to the writer but not yet written to the transport.
//! Producers reserve a slot before queueing and the writer releases slots
//! after each flushed batch. When the cap is reached, [`reserve`] waits for
//! the writer to catch up and gives up after the configured timeout, so a
//! slow peer turns into a `BackpressureTimeout` rather than unbounded memory.
//!
//! [`reserve`]: BackpressureController::reserve

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{DialogError, Result};

/// Default maximum pending frames.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default wait before giving up on a full queue.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between capacity checks while waiting.
const CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Shared pending-frame counter with a cap.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    pub fn new(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
            timeout,
        }
    }

    /// Whether another frame fits without waiting.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.pending.load(Ordering::Acquire) < self.max_pending
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Reserve a slot without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` if at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        let max = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|_| DialogError::BackpressureTimeout)
    }

    /// Reserve a slot, waiting up to the timeout for one to free up.
    pub async fn reserve(&self) -> Result<()> {
        if self.try_reserve().is_ok() {
            return Ok(());
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;
            if self.try_reserve().is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DialogError::BackpressureTimeout);
            }
        }
    }

    /// Release one slot.
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release slots for a written batch.
    #[inline]
    pub fn release_many(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_reserve_up_to_cap() {
        let ctrl = BackpressureController::new(3, DEFAULT_TIMEOUT);
        for _ in 0..3 {
            ctrl.try_reserve().unwrap();
        }
        assert!(!ctrl.can_accept());
        assert!(matches!(
            ctrl.try_reserve(),
            Err(DialogError::BackpressureTimeout)
        ));
        assert_eq!(ctrl.pending_count(), 3);
    }

    #[test]
    fn test_release_never_underflows() {
        let ctrl = BackpressureController::default();
        ctrl.try_reserve().unwrap();
        ctrl.release_many(5);
        assert_eq!(ctrl.pending_count(), 0);
        assert_eq!(ctrl.max_pending(), DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_clone_shares_counter() {
        let a = BackpressureController::new(10, DEFAULT_TIMEOUT);
        let b = a.clone();
        a.try_reserve().unwrap();
        b.try_reserve().unwrap();
        assert_eq!(a.pending_count(), 2);
        b.release();
        assert_eq!(a.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_times_out() {
        let ctrl = BackpressureController::new(1, Duration::from_millis(50));
        ctrl.try_reserve().unwrap();

        let start = Instant::now();
        let result = ctrl.reserve().await;
        assert!(matches!(result, Err(DialogError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_waits_for_release() {
        let ctrl = BackpressureController::new(1, Duration::from_secs(1));
        ctrl.try_reserve().unwrap();

        let releaser = ctrl.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            releaser.release();
        });

        ctrl.reserve().await.unwrap();
        assert_eq!(ctrl.pending_count(), 1);
    }
}
