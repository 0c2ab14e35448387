use std::time::Duration;

use bytes::BytesMut;
use kvseries_core::Report;
use kvseries_core::bucket::{BucketZone, bucket_key_for};
use kvseries_core::codec::encode_report;
use kvseries_core::query::{AppendFailure, AppendSummary};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::kv::KvStore;

/// Writes reports into their day buckets, one append per report.
#[derive(Clone)]
pub struct Appender<S> {
    store: S,
    base_key: String,
    zone: BucketZone,
    timeout: Duration,
}

impl<S: KvStore> Appender<S> {
    pub fn new(store: S, base_key: impl Into<String>, zone: BucketZone) -> Self {
        Self {
            store,
            base_key: base_key.into(),
            zone,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn key_for(&self, report: &Report) -> String {
        bucket_key_for(&self.base_key, self.zone, report.timestamp)
    }

    /// Encodes `report` alone and appends it to its bucket. Returns the key
    /// written to.
    pub async fn append(&self, report: &Report) -> Result<String, StoreError> {
        let key = self.key_for(report);
        let mut buf = BytesMut::new();
        encode_report(report, &mut buf);

        match tokio::time::timeout(self.timeout, self.store.append(&key, buf.freeze())).await {
            Ok(result) => result.map(|()| key),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Appends every report independently and in order. A failed append is
    /// logged and recorded; it never stops the rest of the batch.
    pub async fn append_batch(&self, reports: &[Report]) -> AppendSummary {
        let mut summary = AppendSummary::default();
        for report in reports {
            match self.append(report).await {
                Ok(key) => {
                    debug!(key = %key, series = %report.series, "report appended");
                    summary.appended += 1;
                }
                Err(err) => {
                    let key = self.key_for(report);
                    warn!(key = %key, series = %report.series, error = %err, "report append failed");
                    summary.failed.push(AppendFailure {
                        key,
                        error: err.to_string(),
                    });
                }
            }
        }
        summary
    }
}
