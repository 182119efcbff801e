use crate::PvError;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a deadline-bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(Duration),
    TimedOut(Duration),
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Ready(d) | Self::TimedOut(d) => *d,
        }
    }
}

/// Sleep-and-check loop with a fixed interval and a wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn from_millis(interval_ms: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            interval: self.interval.mul_f64(factor),
            timeout: self.timeout.mul_f64(factor),
        }
    }

    /// Sleep one interval, then evaluate `check`, until it returns true or
    /// the deadline passes. `check` always runs at least once. Errors from
    /// `check` abort the poll.
    pub fn until<F>(&self, mut check: F) -> Result<PollOutcome, PvError>
    where
        F: FnMut() -> Result<bool, PvError>,
    {
        let t_begin = Instant::now();
        loop {
            thread::sleep(self.interval);
            if check()? {
                return Ok(PollOutcome::Ready(t_begin.elapsed()));
            }
            if t_begin.elapsed() >= self.timeout {
                return Ok(PollOutcome::TimedOut(t_begin.elapsed()));
            }
        }
    }
}
