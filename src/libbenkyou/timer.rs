use std::time::{Duration, Instant};

/// Time between two ticks of an active timer.
pub const TICK: Duration = Duration::from_secs(1);

/// Elapsed-time counter for a running quiz.
///
/// The counter is derived from the start instant, so a late tick never drifts.
/// `elapsed_secs` only moves forward on ticks, as the header only redraws then.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
    elapsed_secs: u64,
}

impl Timer {
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.last_tick = Some(now);
        self.elapsed_secs = 0;
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Updates the counter if at least one tick has passed since the last one.
    /// Returns the new value when it changed.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        let started_at = self.started_at?;
        let last_tick = self.last_tick.unwrap_or(started_at);
        if now.saturating_duration_since(last_tick) < TICK {
            return None;
        }
        self.last_tick = Some(now);
        let secs = now.saturating_duration_since(started_at).as_secs();
        if secs == self.elapsed_secs {
            None
        } else {
            self.elapsed_secs = secs;
            Some(secs)
        }
    }

    /// Stops ticking. The last value stays readable.
    pub fn cancel(&mut self) {
        self.started_at = None;
        self.last_tick = None;
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
