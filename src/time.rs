//! Calendar-based instants and spans, with no wall-clock dependency.
//!
//! `Time` wraps a [`chrono::NaiveDateTime`] rather than `DateTime<Utc>`
//! because simulated time is never tied to a real timezone or to the
//! system clock; `TimeSpan` wraps [`chrono::Duration`].

use std::fmt;
use std::ops::{Add, Sub};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time(NaiveDateTime);

impl Time {
    pub fn new(dt: NaiveDateTime) -> Self {
        Time(dt)
    }

    pub fn from_ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> Self {
        Time(
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .expect("valid date")
                .and_hms_opt(h, mi, s)
                .expect("valid time"),
        )
    }

    pub fn inner(&self) -> NaiveDateTime {
        self.0
    }

    pub fn day_of_year(&self) -> i64 {
        use chrono::Datelike;
        i64::from(self.0.ordinal())
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<TimeSpan> for Time {
    type Output = Time;
    fn add(self, rhs: TimeSpan) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl Sub<TimeSpan> for Time {
    type Output = Time;
    fn sub(self, rhs: TimeSpan) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl Sub<Time> for Time {
    type Output = TimeSpan;
    fn sub(self, rhs: Time) -> TimeSpan {
        TimeSpan(self.0 - rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSpan(chrono::Duration);

impl TimeSpan {
    pub fn zero() -> Self {
        TimeSpan(chrono::Duration::zero())
    }

    pub fn days(n: i64) -> Self {
        TimeSpan(chrono::Duration::days(n))
    }

    pub fn seconds(n: i64) -> Self {
        TimeSpan(chrono::Duration::seconds(n))
    }

    /// Fractional number of days, used by time-weighted adapters for
    /// interpolation factors.
    pub fn as_days_f64(&self) -> f64 {
        self.0.num_milliseconds() as f64 / (1000.0 * 60.0 * 60.0 * 24.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == chrono::Duration::zero()
    }

    /// Linear interpolation factor of `self` within `[0, total]`, clamped to `[0, 1]`.
    pub fn fraction_of(&self, total: TimeSpan) -> f64 {
        if total.is_zero() {
            return 0.0;
        }
        (self.0.num_milliseconds() as f64 / total.0.num_milliseconds() as f64).clamp(0.0, 1.0)
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;
    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0 + rhs.0)
    }
}

impl Sub for TimeSpan {
    type Output = TimeSpan;
    fn sub(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0 - rhs.0)
    }
}
