use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{KvSeriesError, Result};

/// Date layout appended to the base key, e.g. `timeseries_2026_02_01`.
pub const BUCKET_DAY_FORMAT: &str = "%Y_%m_%d";

/// Clock used to assign timestamps to calendar days. Ingest and query must
/// agree on it or reports near midnight land in a bucket the query never reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketZone {
    Utc,
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl FromStr for BucketZone {
    type Err = KvSeriesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" | "z" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            other => other
                .parse::<FixedOffset>()
                .map(Self::Fixed)
                .map_err(|e| KvSeriesError::Parse(format!("unknown bucket timezone {s}: {e}"))),
        }
    }
}

impl fmt::Display for BucketZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("utc"),
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

impl BucketZone {
    pub fn day_of(self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => ts.date_naive(),
            Self::Local => ts.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => ts.with_timezone(&offset).date_naive(),
        }
    }

    pub fn start_of_day(self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::Utc => first_instant_of(&Utc, day),
            Self::Local => first_instant_of(&Local, day),
            Self::Fixed(offset) => first_instant_of(&offset, day),
        }
    }

    /// Last whole second belonging to `day`, whether it has 23, 24 or 25 hours.
    pub fn end_of_day(self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::Utc => last_second_of(&Utc, day),
            Self::Local => last_second_of(&Local, day),
            Self::Fixed(offset) => last_second_of(&offset, day),
        }
    }
}

/// Earliest instant whose wall-clock date in `tz` is `day`. When a DST jump
/// skips midnight the day starts where the gap ends; a day skipped entirely
/// starts, and ends, where the next one starts.
fn first_instant_of<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let mut wall = day.and_time(NaiveTime::MIN);
    while wall.date() == day {
        if let Some(dt) = tz.from_local_datetime(&wall).earliest() {
            return dt.with_timezone(&Utc);
        }
        wall += chrono::Duration::minutes(1);
    }
    match day.succ_opt() {
        Some(next) => first_instant_of(tz, next),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

fn last_second_of<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    match day.succ_opt() {
        Some(next) => first_instant_of(tz, next) - chrono::Duration::seconds(1),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

pub fn bucket_key(base: &str, day: NaiveDate) -> String {
    format!("{base}_{}", day.format(BUCKET_DAY_FORMAT))
}

pub fn bucket_key_for(base: &str, zone: BucketZone, ts: DateTime<Utc>) -> String {
    bucket_key(base, zone.day_of(ts))
}

/// Every calendar day from `first` to `last`, both inclusive.
pub fn days_between(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = first;
    while day <= last {
        days.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use chrono::{LocalResult, NaiveDateTime};

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn formats_day_suffix() {
        let day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert_eq!(bucket_key("timeseries", day), "timeseries_2026_02_01");
    }

    #[test]
    fn same_day_same_key() {
        let zone = BucketZone::Utc;
        let a = bucket_key_for("ts", zone, utc(2026, 3, 9, 0, 0, 0));
        let b = bucket_key_for("ts", zone, utc(2026, 3, 9, 23, 59, 59));
        assert_eq!(a, b);
    }

    #[test]
    fn adjacent_days_differ() {
        let zone = BucketZone::Utc;
        let a = bucket_key_for("ts", zone, utc(2026, 3, 9, 23, 59, 59));
        let b = bucket_key_for("ts", zone, utc(2026, 3, 10, 0, 0, 0));
        assert_ne!(a, b);
        assert_eq!(b, "ts_2026_03_10");
    }

    #[test]
    fn fixed_offset_shifts_day() {
        let zone: BucketZone = "+02:00".parse().unwrap();
        assert_eq!(
            bucket_key_for("ts", zone, utc(2026, 3, 9, 23, 0, 0)),
            "ts_2026_03_10"
        );
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(zone.start_of_day(day), utc(2026, 3, 9, 22, 0, 0));
        assert_eq!(zone.end_of_day(day), utc(2026, 3, 10, 21, 59, 59));
    }

    #[test]
    fn parses_zone_names() {
        assert_eq!("UTC".parse::<BucketZone>().unwrap(), BucketZone::Utc);
        assert_eq!("local".parse::<BucketZone>().unwrap(), BucketZone::Local);
        assert!("mars".parse::<BucketZone>().is_err());
    }

    #[test]
    fn enumerates_days_inclusive() {
        let first = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        let last = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let days = days_between(first, last);
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], first);
        assert_eq!(days[3], last);
        assert!(days_between(last, first).is_empty());
    }

    /// Zone at `STD` seconds east of UTC, switching to `DST` at unix second
    /// `SPRING` and back at `FALL`.
    #[derive(Debug, Clone, Copy)]
    struct Shifting<const STD: i32, const DST: i32, const SPRING: i64, const FALL: i64>;

    /// Central European rules for 2026: 23-hour day on 03-29, 25-hour day on 10-25.
    type Berlin2026 = Shifting<3_600, 7_200, 1_774_746_000, 1_792_890_000>;
    /// Clocks jump from 00:00 to 01:00 on 2026-03-08, so that local midnight never happens.
    type MidnightGap2026 = Shifting<{ -18_000 }, { -14_400 }, 1_772_946_000, 1_793_509_200>;

    impl<const STD: i32, const DST: i32, const SPRING: i64, const FALL: i64> TimeZone
        for Shifting<STD, DST, SPRING, FALL>
    {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            Self
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let fits = |east: i32| {
                let offset = FixedOffset::east_opt(east).unwrap();
                let utc = *local - chrono::Duration::seconds(east.into());
                (self.offset_from_utc_datetime(&utc) == offset).then_some(offset)
            };
            match (fits(DST), fits(STD)) {
                (Some(earlier), Some(later)) => LocalResult::Ambiguous(earlier, later),
                (Some(offset), None) | (None, Some(offset)) => LocalResult::Single(offset),
                (None, None) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let secs = utc.and_utc().timestamp();
            let east = if (SPRING..FALL).contains(&secs) { DST } else { STD };
            FixedOffset::east_opt(east).unwrap()
        }
    }

    fn day_in<Tz: TimeZone>(tz: &Tz, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(tz).date_naive()
    }

    #[test]
    fn long_day_keeps_its_last_hour() {
        let tz = Berlin2026 {};
        let day = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();

        let end = last_second_of(&tz, day);
        assert_eq!(end, utc(2026, 10, 25, 22, 59, 59));
        assert_eq!(
            end - first_instant_of(&tz, day),
            chrono::Duration::hours(25) - chrono::Duration::seconds(1)
        );

        let late_report = utc(2026, 10, 25, 22, 30, 0);
        assert_eq!(day_in(&tz, late_report), day);
        assert!(late_report < end);
        let after = end + chrono::Duration::seconds(1);
        assert_eq!(day_in(&tz, after), day.succ_opt().unwrap());
    }

    #[test]
    fn short_day_stops_before_next_day() {
        let tz = Berlin2026 {};
        let day = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap();

        let end = last_second_of(&tz, day);
        assert_eq!(end, utc(2026, 3, 29, 21, 59, 59));
        assert_eq!(day_in(&tz, end), day);
        assert_eq!(first_instant_of(&tz, day), utc(2026, 3, 28, 23, 0, 0));
    }

    #[test]
    fn skipped_midnight_starts_after_gap() {
        let tz = MidnightGap2026 {};
        let day = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();

        let start = first_instant_of(&tz, day);
        assert_eq!(start, utc(2026, 3, 8, 5, 0, 0));
        assert_eq!(day_in(&tz, start), day);

        let previous = day.pred_opt().unwrap();
        assert_eq!(last_second_of(&tz, previous), utc(2026, 3, 8, 4, 59, 59));
        assert_eq!(day_in(&tz, utc(2026, 3, 8, 4, 59, 59)), previous);
    }

    #[test]
    fn local_days_tile_without_gaps() {
        let zone = BucketZone::Local;
        for (m, d) in [(3, 8), (3, 29), (6, 21), (10, 25), (11, 1), (12, 31)] {
            let day = NaiveDate::from_ymd_opt(2026, m, d).unwrap();
            let start = zone.start_of_day(day);
            let end = zone.end_of_day(day);
            assert_eq!(zone.day_of(start), day);
            assert_eq!(zone.day_of(end), day);
            let next = day.succ_opt().unwrap();
            let after = end + chrono::Duration::seconds(1);
            assert_eq!(zone.day_of(after), next);
            assert_eq!(after, zone.start_of_day(next));
        }
    }
}
