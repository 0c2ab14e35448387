use std::net::SocketAddr;

use kvseries_core::error::{KvSeriesError, Result};
use kvseries_store::{Appender, KvStore};

use crate::http;

pub async fn run_ingest_server<S: KvStore>(
    appender: Option<Appender<S>>,
    addr: SocketAddr,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| KvSeriesError::Ingest(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(addr = %addr, "ingest server listening");

    axum::serve(listener, http::router(appender))
        .await
        .map_err(|e| KvSeriesError::Ingest(format!("HTTP server failed: {e}")))
}
