use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{KvSeriesError, Result};

/// Calendar day layout accepted by the query surfaces.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn parse_day(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
        .map_err(|e| KvSeriesError::Parse(format!("expected YYYY-MM-DD, got {input}: {e}")))
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| KvSeriesError::Parse(format!("invalid duration {input}: {e}")))
}
