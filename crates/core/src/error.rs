use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KvSeriesError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("corrupt bucket: {0}")]
    Codec(#[from] CodecError),

    #[error("storage error: {0}")]
    Store(String),

    #[error("ingest error: {0}")]
    Ingest(String),
}

pub type Result<T> = std::result::Result<T, KvSeriesError>;
