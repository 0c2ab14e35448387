//! Binary encoding of reports as stored in a day bucket.
//!
//! Each record is laid out little-endian, fixed-width fields first:
//!
//! ```text
//! i64 timestamp (unix seconds)
//! f64 value
//! i64 series_len
//! i64 metadata_count
//! [series_len] series bytes
//! metadata_count * (i64 key_len, i64 value_len, [key_len] key, [value_len] value)
//! ```
//!
//! A bucket is the plain concatenation of records with no outer framing, so a
//! decoder walks the buffer record by record until it is exhausted.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::DateTime;
use thiserror::Error;

use crate::model::report::Report;

const FIXED_HEADER_LEN: usize = 32;
const PAIR_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Value,
    SeriesLen,
    MetadataCount,
    Series,
    KeyLen,
    ValueLen,
    Key,
    LabelValue,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timestamp => "timestamp",
            Self::Value => "value",
            Self::SeriesLen => "series length",
            Self::MetadataCount => "metadata count",
            Self::Series => "series",
            Self::KeyLen => "metadata key length",
            Self::ValueLen => "metadata value length",
            Self::Key => "metadata key",
            Self::LabelValue => "metadata value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("truncated record: {field} needs {needed} bytes, {remaining} remain")]
    Truncated {
        field: Field,
        needed: usize,
        remaining: usize,
    },

    #[error("negative {field}: {value}")]
    NegativeLength { field: Field, value: i64 },

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

/// Exact number of bytes `encode_report` writes for `report`.
pub fn encoded_len(report: &Report) -> usize {
    FIXED_HEADER_LEN
        + report.series.len()
        + report
            .metadata
            .iter()
            .map(|(k, v)| PAIR_HEADER_LEN + k.len() + v.len())
            .sum::<usize>()
}

pub fn encode_report(report: &Report, out: &mut BytesMut) {
    out.reserve(encoded_len(report));

    // String lengths never exceed isize::MAX, so the casts are lossless.
    out.put_i64_le(report.timestamp.timestamp());
    out.put_f64_le(report.value);
    out.put_i64_le(report.series.len() as i64);
    out.put_i64_le(report.metadata.len() as i64);

    out.put_slice(report.series.as_bytes());
    for (key, value) in &report.metadata {
        out.put_i64_le(key.len() as i64);
        out.put_i64_le(value.len() as i64);
        out.put_slice(key.as_bytes());
        out.put_slice(value.as_bytes());
    }
}

pub fn encode_reports(reports: &[Report]) -> Bytes {
    let mut out = BytesMut::with_capacity(reports.iter().map(encoded_len).sum());
    for report in reports {
        encode_report(report, &mut out);
    }
    out.freeze()
}

/// Decodes the record starting at `pos` and returns it with the position just
/// past its last byte.
pub fn decode_report(buf: &[u8], pos: usize) -> Result<(Report, usize), CodecError> {
    let Some(mut cursor) = buf.get(pos..) else {
        return Err(CodecError::Truncated {
            field: Field::Timestamp,
            needed: 8,
            remaining: 0,
        });
    };
    let available = cursor.len();

    let secs = read_i64(&mut cursor, Field::Timestamp)?;
    let value = read_f64(&mut cursor, Field::Value)?;
    let series_len = read_len(&mut cursor, Field::SeriesLen)?;
    let metadata_count = read_len(&mut cursor, Field::MetadataCount)?;

    let timestamp = DateTime::from_timestamp(secs, 0).ok_or(CodecError::TimestampOutOfRange(secs))?;
    let series = read_text(&mut cursor, series_len, Field::Series)?;

    let mut report = Report::new(series, value, timestamp);
    for _ in 0..metadata_count {
        let key_len = read_len(&mut cursor, Field::KeyLen)?;
        let value_len = read_len(&mut cursor, Field::ValueLen)?;
        let key = read_text(&mut cursor, key_len, Field::Key)?;
        let label = read_text(&mut cursor, value_len, Field::LabelValue)?;
        report.metadata.insert(key, label);
    }

    Ok((report, pos + (available - cursor.len())))
}

/// Decodes a whole bucket. An empty buffer is an empty bucket; trailing bytes
/// that do not form a complete record fail the entire decode.
pub fn decode_reports(buf: &[u8]) -> Result<Vec<Report>, CodecError> {
    let mut reports = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (report, next) = decode_report(buf, pos)?;
        reports.push(report);
        pos = next;
    }
    Ok(reports)
}

fn ensure(cursor: &&[u8], needed: usize, field: Field) -> Result<(), CodecError> {
    if cursor.remaining() < needed {
        return Err(CodecError::Truncated {
            field,
            needed,
            remaining: cursor.remaining(),
        });
    }
    Ok(())
}

fn read_i64(cursor: &mut &[u8], field: Field) -> Result<i64, CodecError> {
    ensure(cursor, 8, field)?;
    Ok(cursor.get_i64_le())
}

fn read_f64(cursor: &mut &[u8], field: Field) -> Result<f64, CodecError> {
    ensure(cursor, 8, field)?;
    Ok(cursor.get_f64_le())
}

fn read_len(cursor: &mut &[u8], field: Field) -> Result<usize, CodecError> {
    let value = read_i64(cursor, field)?;
    usize::try_from(value).map_err(|_| CodecError::NegativeLength { field, value })
}

fn read_text(cursor: &mut &[u8], len: usize, field: Field) -> Result<String, CodecError> {
    ensure(cursor, len, field)?;
    let text = String::from_utf8_lossy(&cursor[..len]).into_owned();
    cursor.advance(len);
    Ok(text)
}
