use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::{Mutex, PoisonError};

/// Hands out strictly increasing UTC timestamps at microsecond precision.
///
/// Used by the in-process stores; the relational store takes its timestamps
/// from the database instead. Microseconds keep both at the same precision.
#[derive(Debug, Default)]
pub struct Clock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(previous) = *last {
            if now <= previous {
                now = previous.trunc_subsecs(6) + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// Makes every later `now()` strictly greater than `seen`.
    pub fn observe(&self, seen: DateTime<Utc>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if (*last).is_none_or(|previous| previous < seen) {
            *last = Some(seen);
        }
    }
}
