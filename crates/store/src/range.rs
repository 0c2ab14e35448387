use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use kvseries_core::bucket::{BucketZone, bucket_key};
use kvseries_core::{KvSeriesError, Report};
use kvseries_core::codec::decode_reports;
use kvseries_core::filter::ReportFilter;
use kvseries_core::query::{BucketStatus, BucketSummary};
use kvseries_core::window::{QueryWindow, trim_to_window};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::kv::KvStore;

/// How per-day results are ordered before the window trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOrder {
    /// Stable sort by timestamp; reports sharing a second keep append order.
    #[default]
    Sorted,
    /// Day order, then append order inside each bucket. The trim is only
    /// exact when producers appended in timestamp order.
    AsAppended,
}

impl MergeOrder {
    pub fn from_sort_flag(sort_merged: bool) -> Self {
        if sort_merged { Self::Sorted } else { Self::AsAppended }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BucketOutcome {
    Loaded(Vec<Report>),
    Missing,
    Failed(KvSeriesError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub day: NaiveDate,
    pub key: String,
    pub outcome: BucketOutcome,
}

impl DayBucket {
    pub fn summary(&self) -> BucketSummary {
        let status = match &self.outcome {
            BucketOutcome::Loaded(reports) => BucketStatus::Loaded {
                count: reports.len(),
            },
            BucketOutcome::Missing => BucketStatus::Missing,
            BucketOutcome::Failed(error) => BucketStatus::Failed {
                error: error.to_string(),
            },
        };
        BucketSummary {
            day: self.day,
            key: self.key.clone(),
            status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeOutcome {
    pub reports: Vec<Report>,
    pub buckets: Vec<BucketSummary>,
}

/// Reads the day buckets a window spans and stitches them into one
/// time-filtered sequence. Individual days that cannot be read contribute
/// nothing; the query itself never fails.
#[derive(Clone)]
pub struct RangeReader<S> {
    store: S,
    base_key: String,
    zone: BucketZone,
    fetch_timeout: Duration,
    order: MergeOrder,
}

impl<S: KvStore> RangeReader<S> {
    pub fn new(store: S, base_key: impl Into<String>, zone: BucketZone) -> Self {
        Self {
            store,
            base_key: base_key.into(),
            zone,
            fetch_timeout: Duration::from_secs(10),
            order: MergeOrder::Sorted,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_order(mut self, order: MergeOrder) -> Self {
        self.order = order;
        self
    }

    pub fn zone(&self) -> BucketZone {
        self.zone
    }

    pub async fn fetch_day(&self, day: NaiveDate) -> DayBucket {
        let key = bucket_key(&self.base_key, day);
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.store.get(&key)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.fetch_timeout)),
        };

        let outcome = match fetched {
            Ok(None) => BucketOutcome::Missing,
            Ok(Some(bytes)) => match decode_reports(&bytes) {
                Ok(reports) => BucketOutcome::Loaded(reports),
                Err(err) => BucketOutcome::Failed(err.into()),
            },
            Err(err) => BucketOutcome::Failed(err.into()),
        };

        match &outcome {
            BucketOutcome::Failed(error) => {
                warn!(key = %key, error = %error, "bucket fetch failed; skipping day");
            }
            BucketOutcome::Missing => debug!(key = %key, "bucket missing"),
            BucketOutcome::Loaded(reports) => {
                debug!(key = %key, count = reports.len(), "bucket loaded");
            }
        }

        DayBucket { day, key, outcome }
    }

    /// Fetches all `days` concurrently; the result keeps the order of `days`.
    pub async fn fetch_days(&self, days: &[NaiveDate]) -> Vec<DayBucket> {
        join_all(days.iter().map(|day| self.fetch_day(*day))).await
    }

    pub async fn query(&self, window: &QueryWindow, filter: &ReportFilter) -> RangeOutcome {
        let buckets = self.fetch_days(&window.days(self.zone)).await;
        let summaries = buckets.iter().map(DayBucket::summary).collect();
        let merged = merge_buckets(buckets, self.order);
        let trimmed = trim_to_window(&merged, window);
        let reports = if filter.is_empty() {
            trimmed.to_vec()
        } else {
            trimmed.iter().filter(|r| filter.matches(r)).cloned().collect()
        };

        RangeOutcome {
            reports,
            buckets: summaries,
        }
    }
}

/// Concatenates loaded buckets in the given day order.
pub fn merge_buckets(buckets: Vec<DayBucket>, order: MergeOrder) -> Vec<Report> {
    let mut merged: Vec<Report> = buckets
        .into_iter()
        .flat_map(|bucket| match bucket.outcome {
            BucketOutcome::Loaded(reports) => reports,
            BucketOutcome::Missing | BucketOutcome::Failed(_) => Vec::new(),
        })
        .collect();

    if order == MergeOrder::Sorted {
        merged.sort_by_key(|r| r.timestamp);
    }
    merged
}
