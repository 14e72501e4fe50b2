use std::time::{Duration, Instant};

/// Default poll interval for the monitor loop.
///
/// Kept short on purpose: a longer interval lets the candidate allocate and
/// free memory between two ticks, and that spike never shows up in the peak.
/// The cost is a monitor that wakes roughly a thousand times per second.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed-interval scheduler for a cooperative poll loop.
///
/// Ticks are scheduled on a fixed grid; when the caller falls behind, the
/// grid restarts from now instead of firing a burst of catch-up ticks.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next tick is due.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            self.next = now + self.interval;
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_at_least_one_interval() {
        let mut ticker = Ticker::new(Duration::from_millis(20));
        let start = Instant::now();
        ticker.wait();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn falling_behind_does_not_burst() {
        let mut ticker = Ticker::new(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(50));
        // Overdue: returns immediately and reschedules from now.
        ticker.wait();
        let start = Instant::now();
        ticker.wait();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn default_interval_is_sub_10ms() {
        assert!(Ticker::default().interval() < Duration::from_millis(10));
    }
}
