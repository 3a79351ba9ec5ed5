use std::time::{Duration, Instant};

/// A repeating deadline owned by exactly one thumbnail. The control loop
/// asks for the earliest deadline and calls [`RepeatingTimer::poll`] when it
/// wakes; nothing fires once the timer is cancelled or dropped.
#[derive(Debug, Clone)]
pub struct RepeatingTimer {
    period: Duration,
    next: Option<Instant>,
}

impl RepeatingTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }

    /// Cancel and start again with a new period.
    pub fn restart(&mut self, period: Duration, now: Instant) {
        self.period = period.max(Duration::from_millis(1));
        self.start(now);
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Returns true when the timer was due, scheduling the next tick. A timer
    /// that fell more than a period behind is re-anchored on `now` instead of
    /// firing a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(next) = self.next else {
            return false;
        };
        if now < next {
            return false;
        }
        let following = next + self.period;
        self.next = Some(if following <= now {
            now + self.period
        } else {
            following
        });
        true
    }
}
