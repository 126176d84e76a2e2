//! Single-shot retransmission timer.
//!
//! The timer never fires by itself; engines read [`Timer::deadline`] and hand
//! it to [`crate::UnreliableChannel::recv_until`], so waiting for an ack is a
//! suspended receive bounded by the deadline rather than a spin loop.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Timer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Arm (or re-arm) the timer at `now + duration`.
    pub fn start(&mut self) {
        self.deadline = Some(Instant::now() + self.duration);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before expiry; zero when expired, `None` when idle.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn state(&self) -> TimerState {
        match self.deadline {
            None => TimerState::Idle,
            Some(_) if self.expired() => TimerState::Expired,
            Some(_) => TimerState::Running,
        }
    }
}
