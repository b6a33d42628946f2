// src/interval.rs
//! Half-open time intervals and random instants within them.

use chrono::{DateTime, SubsecRound, Utc};
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    /// Process-wide random source, seeded once from OS entropy.
    static ref RNG: Mutex<StdRng> = Mutex::new(StdRng::from_entropy());
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid RFC 3339 timestamp {0:?}: {1}")]
    Timestamp(String, String),

    #[error("interval end {end} is before start {start}")]
    Inverted {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// The interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse an interval from RFC 3339 timestamps, rejecting `end < start`
    pub fn parse_rfc3339(start: &str, end: &str) -> Result<Self, IntervalError> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| IntervalError::Timestamp(s.to_string(), e.to_string()))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if end < start {
            return Err(IntervalError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Copy of this interval with both ends truncated to whole seconds.
    pub fn truncated_to_seconds(&self) -> Self {
        Self {
            start: self.start.trunc_subsecs(0),
            end: self.end.trunc_subsecs(0),
        }
    }

    /// Whether `t` falls inside `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Returns a random whole-second instant within the interval, drawn from the
/// process-wide random source.
///
/// Returns `None` if there is no interval, if `end <= start`, or if no
/// instant with a zero sub-second component lies inside `[start, end)`.
pub fn random_instant(interval: Option<&Interval>) -> Option<DateTime<Utc>> {
    // A poisoned lock only means another thread panicked mid-draw; the
    // generator state is still usable.
    let mut rng = RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    random_instant_with(interval, &mut *rng)
}

/// Same as [`random_instant`] but draws from the given generator, so callers
/// can use a seeded source for reproducible results.
pub fn random_instant_with<R: Rng + ?Sized>(
    interval: Option<&Interval>,
    rng: &mut R,
) -> Option<DateTime<Utc>> {
    let interval = interval?;
    if interval.end <= interval.start {
        return None;
    }

    // First second boundary at or after start.
    let first = if interval.start.timestamp_subsec_nanos() == 0 {
        interval.start.timestamp()
    } else {
        interval.start.timestamp() + 1
    };

    // Last second boundary strictly before end.
    let last = if interval.end.timestamp_subsec_nanos() == 0 {
        interval.end.timestamp() - 1
    } else {
        interval.end.timestamp()
    };

    if first > last {
        return None;
    }

    DateTime::from_timestamp(rng.gen_range(first..=last), 0)
}
