pub mod append;
pub mod error;
pub mod http;
pub mod kv;
pub mod memory;
pub mod range;

pub use append::Appender;
pub use error::StoreError;
pub use http::{HttpKvConfig, HttpKvStore};
pub use kv::KvStore;
pub use memory::MemoryStore;
pub use range::{MergeOrder, RangeReader};
