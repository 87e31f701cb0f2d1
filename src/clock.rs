//! Wall-clock source in whole seconds since the Unix epoch.

use chrono::{Local, TimeZone, Utc};

pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Always reports the same instant. Useful for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 { self.0 }
}

/// `YYYY-MM-DD HH:MM:SS` in the local timezone.
pub fn fmt_local_ts(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch.to_string(),
    }
}
