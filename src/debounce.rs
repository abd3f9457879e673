//! Trailing-edge debounce driven by a host clock
//!
//! Nothing here spawns timers. The host schedules values as events arrive and
//! polls with its current time; a value is released once no newer value was
//! scheduled for the whole wait window.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    wait: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            pending: None,
        }
    }

    pub fn from_millis(wait_ms: u64) -> Self {
        Self::new(Duration::from_millis(wait_ms))
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Replace any pending value and restart the quiet window
    pub fn schedule(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.wait, value));
    }

    /// Release the pending value if its quiet window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if now >= *deadline => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    /// Release the pending value immediately
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, v)| v)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
