use std::time::Duration;

use kvseries_core::KvSeriesError;
use thiserror::Error;

/// Failures talking to the KV service. A missing key is not one of them:
/// `KvStore::get` reports it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("kv service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for KvSeriesError {
    fn from(err: StoreError) -> Self {
        KvSeriesError::Store(err.to_string())
    }
}
