use chrono::Utc;

use crate::traits::{Clock, Timestamp};

/// Wall-clock time source
///
/// Reports the host's current UTC time unchanged. Use this wherever code
/// should run against real time.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::thread;

    #[test]
    fn test_wall_clock_advances() {
        let clock = SystemClock::new();
        let first = clock.now();
        thread::sleep(std::time::Duration::from_millis(10));
        let second = clock.now();

        assert!(second > first);
        assert!(second - first >= Duration::milliseconds(9));
    }
}
