//! The single-shot countdown timer consumed by the link controller.
//!
//! A real `SIGALRM`-style signal would also fit, but a non-blocking read
//! plus a monotonic deadline check needs no signal handler and composes
//! cleanly with `ByteChannel::read_one`'s own non-blocking poll — the same
//! style already used for serial timing elsewhere (elapsed-time comparisons
//! against `Instant`, rather than a wall-clock callback).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// A single-shot countdown timer with an atomic expired flag.
///
/// Only one timer is armed at a time; `arm` resets the flag before
/// scheduling the new deadline, so a stale expiration never leaks across
/// retries.
pub trait CountdownTimer {
    /// Schedules expiration `seconds` from now, clearing any previous
    /// expired state.
    fn arm(&mut self, seconds: u64);

    /// Cancels the current deadline. Does not clear `expired` if it has
    /// already fired.
    fn disarm(&mut self);

    /// True once the armed deadline has passed. Polled from the main flow,
    /// not from a signal handler, but kept atomic so the implementation can
    /// be swapped for a real signal-driven one without changing callers.
    fn expired(&self) -> bool;

    /// Running count of expirations seen across the timer's lifetime,
    /// surfaced so the CLI can report retransmission statistics via
    /// `close(show_statistics)`.
    fn expirations(&self) -> u32;
}

/// Deadline-polling [`CountdownTimer`] backed by [`Instant`].
pub struct DeadlineTimer {
    deadline: Option<Instant>,
    expired: AtomicBool,
    expirations: AtomicU32,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self {
            deadline: None,
            expired: AtomicBool::new(false),
            expirations: AtomicU32::new(0),
        }
    }

    /// Re-checks the deadline against the clock and latches `expired` if it
    /// has passed. Called internally by `expired()`; also callable directly
    /// by a caller that wants to force a fresh check before reading the flag.
    fn poll(&self) {
        if self.expired.load(Ordering::Relaxed) {
            return;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.expired.store(true, Ordering::Relaxed);
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for DeadlineTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownTimer for DeadlineTimer {
    fn arm(&mut self, seconds: u64) {
        self.expired.store(false, Ordering::Relaxed);
        self.deadline = Some(Instant::now() + Duration::from_secs(seconds));
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn expired(&self) -> bool {
        self.poll();
        self.expired.load(Ordering::Relaxed)
    }

    fn expirations(&self) -> u32 {
        self.expirations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn not_expired_before_deadline() {
        let mut timer = DeadlineTimer::new();
        timer.arm(10);
        assert!(!timer.expired());
    }

    #[test]
    fn expires_after_deadline_and_counts() {
        let mut timer = DeadlineTimer::new();
        // Duration of zero: the deadline is already in the past by the
        // time we poll it.
        timer.deadline = Some(Instant::now());
        sleep(Duration::from_millis(5));
        assert!(timer.expired());
        assert_eq!(timer.expirations(), 1);
        // Flag stays latched until the next arm.
        assert!(timer.expired());
        assert_eq!(timer.expirations(), 1);
    }

    #[test]
    fn arm_resets_expired_flag() {
        let mut timer = DeadlineTimer::new();
        timer.deadline = Some(Instant::now());
        sleep(Duration::from_millis(5));
        assert!(timer.expired());
        timer.arm(10);
        assert!(!timer.expired());
    }

    #[test]
    fn disarm_prevents_expiration() {
        let mut timer = DeadlineTimer::new();
        timer.deadline = Some(Instant::now());
        timer.disarm();
        assert!(!timer.expired());
    }
}
