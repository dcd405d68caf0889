//! # Rate gate
//! Sliding-window admission control per channel, requests-per-minute.
//! Sliding (not fixed) window so bursts at window boundaries can never
//! exceed the configured ceiling.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum/maximum poll interval while waiting for the window to slide.
const POLL_FLOOR: Duration = Duration::from_millis(10);
const POLL_CEIL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct RateGate {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    /// Gate with a one-minute window, the configuration unit used everywhere.
    pub fn per_minute(rpm: u32) -> Self {
        Self::with_window(rpm as usize, Duration::from_secs(60))
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Non-blocking: admit one unit of work if the window has room.
    pub fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.admitted.lock().expect("rate gate mutex poisoned");
        while let Some(front) = admitted.front() {
            if now.duration_since(*front) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
        if admitted.len() < self.limit {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Suspend until the window admits a unit of work. Polling keeps the
    /// gate free of timers and wakeups when nobody is waiting.
    pub async fn admit(&self) {
        let poll = (self.window / self.limit as u32).clamp(POLL_FLOOR, POLL_CEIL);
        loop {
            if self.try_admit() {
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_is_enforced_within_window() {
        let gate = RateGate::with_window(2, Duration::from_secs(60));
        assert!(gate.try_admit());
        assert!(gate.try_admit());
        assert!(!gate.try_admit());
    }

    #[test]
    fn admission_resumes_after_window_slides() {
        let gate = RateGate::with_window(1, Duration::from_millis(40));
        assert!(gate.try_admit());
        assert!(!gate.try_admit());
        std::thread::sleep(Duration::from_millis(60));
        assert!(gate.try_admit());
    }

    #[tokio::test]
    async fn admit_suspends_then_proceeds() {
        let gate = RateGate::with_window(1, Duration::from_millis(50));
        assert!(gate.try_admit());
        let t0 = Instant::now();
        gate.admit().await;
        assert!(t0.elapsed() >= Duration::from_millis(40));
    }
}
