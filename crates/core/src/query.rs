use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::filter::ReportFilter;
use crate::model::report::Report;
use crate::window::DayRange;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeRequest {
    pub range: DayRange,
    pub filter: ReportFilter,
}

/// What a single day contributed to a range query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BucketStatus {
    Loaded { count: usize },
    Missing,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketSummary {
    pub day: NaiveDate,
    pub key: String,
    #[serde(flatten)]
    pub status: BucketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeResponse {
    pub group: Option<String>,
    pub date_start: String,
    pub date_end: String,
    pub reports: Vec<Report>,
    pub buckets: Vec<BucketSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendSummary {
    pub appended: usize,
    pub failed: Vec<AppendFailure>,
}
