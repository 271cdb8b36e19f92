use std::time::{Duration, Instant};

/// Owned stopwatch replacing a process-wide "time since last call" map.
///
/// Each holder keeps its own reference instant, so timings of different
/// stages or loops never interfere.
#[derive(Clone, Copy, Debug)]
pub struct TimeMark {
    last: Instant,
}

impl TimeMark {
    pub fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous mark (or creation), then resets the mark.
    pub fn mark(&mut self) -> f64 {
        let now = Instant::now();
        let secs = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        secs
    }

    /// Time since the previous mark without resetting it.
    pub fn elapsed(&self) -> Duration {
        self.last.elapsed()
    }
}

impl Default for TimeMark {
    fn default() -> Self {
        Self::start()
    }
}
