//! Source of "today" for staleness decisions and capture dates.

use chrono::{NaiveDate, Utc};
use std::fmt::Debug;

/// Supplies the current calendar day.
pub trait Clock: Send + Sync + Debug {
    /// Today's date.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock frozen on one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
