//! Time source for status timestamps.

use chrono::{DateTime, Utc};

/// Source of "now" for history entries and condition transitions
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
#[cfg(test)]
#[derive(Debug)]
pub struct FakeClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FakeClock {
    pub fn at(secs: i64) -> Self {
        use chrono::TimeZone;
        Self(std::sync::Mutex::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default()))
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
