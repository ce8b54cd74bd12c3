//! Cooperative abort signalling
//!
//! An [`AbortFlag`] is raised from outside the calibration (e.g. a Ctrl+C handler)
//! and observed by the calibration only at its suspension points: timed waits and
//! the boundaries between device transactions. A transaction in flight always
//! completes before the abort is honoured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting on an [`AbortFlag`].
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared, cloneable abort request.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort. Idempotent.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless an abort is requested first.
    ///
    /// Returns `true` if the full duration elapsed without an abort and `false`
    /// if the flag was raised before or during the wait.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_raised() {
            return false;
        }

        let deadline = Instant::now() + duration;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(ABORT_POLL_INTERVAL));
            if self.is_raised() {
                return false;
            }
        }

        !self.is_raised()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = AbortFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_raised());
        handle.raise();
        assert!(flag.is_raised());
        handle.raise();
        assert!(flag.is_raised());
    }

    #[test]
    fn test_sleep_completes_without_abort() {
        let flag = AbortFlag::new();
        let start = Instant::now();
        assert!(flag.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_zero_sleep_returns_immediately() {
        assert!(AbortFlag::new().sleep(Duration::ZERO));
    }

    #[test]
    fn test_sleep_returns_false_when_already_raised() {
        let flag = AbortFlag::new();
        flag.raise();
        assert!(!flag.sleep(Duration::ZERO));
        assert!(!flag.sleep(Duration::from_secs(10)));
    }

    #[test]
    fn test_sleep_is_interrupted() {
        let flag = AbortFlag::new();
        let handle = flag.clone();
        let raiser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.raise();
        });

        let start = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        raiser.join().unwrap();
    }
}
