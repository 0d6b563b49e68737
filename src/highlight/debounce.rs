//! Debouncing with an injected clock

use std::time::{Duration, Instant};

/// Trailing-edge debouncer: every `schedule` supersedes the pending one
#[derive(Debug, Clone)]
pub struct Debouncer {
    /// Debounce delay
    delay: Duration,

    /// When the pending call fires
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Get the debounce delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Request a call; pushes any pending deadline back
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the pending call if its deadline has passed
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending call
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
