use std::future::Future;

use bytes::Bytes;

use crate::error::StoreError;

/// The two operations the remote key-value service offers. Implementations
/// are bound to a single project at construction.
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Full accumulated blob stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, StoreError>> + Send;

    /// Appends `data` to the blob under `key`, creating it when absent.
    fn append(&self, key: &str, data: Bytes) -> impl Future<Output = Result<(), StoreError>> + Send;
}
