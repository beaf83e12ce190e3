//! Monotonic timestamp source.
//!
//! Queue ordering and the audit indices key on timestamps, so two events
//! issued by this process never share one. Resolution is one microsecond,
//! which is what Postgres `timestamptz` stores.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Hands out strictly increasing UTC timestamps.
#[derive(Debug, Default)]
pub struct Clock {
    last_micros: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock now, bumped forward by 1µs if it would not advance past
    /// the last timestamp returned.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let wall_micros = wall.timestamp_micros();

        let mut prev = self.last_micros.load(Ordering::Acquire);
        loop {
            let next = wall_micros.max(prev + 1);
            match self.last_micros.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or(wall),
                Err(actual) => prev = actual,
            }
        }
    }
}
