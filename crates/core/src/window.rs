use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::{BucketZone, bucket_key, days_between};
use crate::error::{KvSeriesError, Result};
use crate::model::report::Report;

/// Calendar-day bounds as a caller supplies them, both optional.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// A normalized query window. Reports strictly after `start` and strictly
/// before `end` are inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    /// An explicit end day extends to that day's last second; an explicit
    /// start day begins at its midnight. Missing bounds fall back to
    /// `lookback` before the end, and the end to `now`.
    pub fn resolve(
        range: DayRange,
        now: DateTime<Utc>,
        zone: BucketZone,
        lookback: Duration,
    ) -> Result<Self> {
        let lookback = chrono::Duration::from_std(lookback)
            .map_err(|e| KvSeriesError::InvalidArgument(format!("lookback out of range: {e}")))?;

        let end = match range.end {
            Some(day) => zone.end_of_day(day),
            None => now,
        };
        let start = match range.start {
            Some(day) => zone.start_of_day(day),
            None => end - lookback,
        };

        if start > end {
            return Err(KvSeriesError::InvalidArgument(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The buckets this window touches, oldest first.
    pub fn days(&self, zone: BucketZone) -> Vec<NaiveDate> {
        days_between(zone.day_of(self.start), zone.day_of(self.end))
    }

    /// Storage keys of the buckets returned by `days`.
    pub fn bucket_keys(&self, base: &str, zone: BucketZone) -> Vec<String> {
        self.days(zone)
            .into_iter()
            .map(|day| bucket_key(base, day))
            .collect()
    }
}

/// Narrows `reports` to the window by binary search. The input must already
/// be ascending by timestamp; otherwise the bounds are unspecified.
pub fn trim_to_window<'a>(reports: &'a [Report], window: &QueryWindow) -> &'a [Report] {
    let lo = reports.partition_point(|r| r.timestamp <= window.start);
    let hi = reports.partition_point(|r| r.timestamp < window.end);
    if hi <= lo { &[] } else { &reports[lo..hi] }
}
