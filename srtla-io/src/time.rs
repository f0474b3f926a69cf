//! Timer primitives for the bonding worker
//!
//! The bonding worker polls nonblocking sockets on a short tick; these types
//! turn that tick into periodic and one-shot timer semantics.

use std::time::{Duration, Instant};

/// Periodic interval timer
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}

/// One-shot deadline, disarmed until armed and after firing
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    due: Option<Instant>,
}

impl Deadline {
    /// Create a disarmed deadline
    pub fn new() -> Self {
        Deadline { due: None }
    }

    /// Arm the deadline to fire after `timeout`
    pub fn arm(&mut self, timeout: Duration) {
        self.due = Some(Instant::now() + timeout);
    }

    /// Disarm the deadline
    pub fn cancel(&mut self) {
        self.due = None;
    }

    /// Check whether the deadline is armed
    pub fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    /// Fire the deadline if it is due, disarming it
    pub fn try_fire(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_after_interval() {
        let mut timer = Timer::new(Duration::from_millis(10));
        assert!(!timer.try_fire());
        std::thread::sleep(Duration::from_millis(15));
        assert!(timer.try_fire());
        // reset on fire
        assert!(!timer.try_fire());
    }

    #[test]
    fn test_deadline_one_shot() {
        let mut deadline = Deadline::new();
        assert!(!deadline.is_armed());
        assert!(!deadline.try_fire(Instant::now()));

        deadline.arm(Duration::from_millis(0));
        assert!(deadline.is_armed());
        let now = Instant::now() + Duration::from_millis(1);
        assert!(deadline.try_fire(now));
        // disarmed after firing
        assert!(!deadline.try_fire(now));
    }

    #[test]
    fn test_deadline_cancel() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::from_millis(0));
        deadline.cancel();
        assert!(!deadline.try_fire(Instant::now() + Duration::from_secs(1)));
    }
}
