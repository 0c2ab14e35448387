pub mod bucket;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod query;
pub mod time;
pub mod window;

pub use error::{KvSeriesError, Result};
pub use model::report::Report;
