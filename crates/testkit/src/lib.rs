use std::collections::HashMap;
use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use kvseries_core::Report;
use kvseries_store::{KvStore, MemoryStore};
use tokio::task::JoinHandle;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn report(series: &str, value: f64, ts: DateTime<Utc>, labels: &[(&str, &str)]) -> Report {
    labels
        .iter()
        .fold(Report::new(series, value, ts), |r, (k, v)| r.with_label(*k, *v))
}

/// Two reports on `day` (UTC): `cpu` at 09:00 tagged `host=a`, `mem` at 10:00.
pub fn sample_day(day: NaiveDate) -> Vec<Report> {
    let base = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
    vec![
        report("cpu", 0.42, base + chrono::Duration::hours(9), &[("host", "a")]),
        report("mem", 2048.0, base + chrono::Duration::hours(10), &[]),
    ]
}

/// In-process stand-in for the remote KV service's HTTP API, backed by a
/// `MemoryStore` the test can inspect or sabotage.
pub struct MockKv {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct MockState {
    store: MemoryStore,
    project: String,
    token: String,
}

impl MockKv {
    pub async fn start(project: &str, token: &str) -> anyhow::Result<Self> {
        let store = MemoryStore::new();
        let state = MockState {
            store: store.clone(),
            project: project.to_string(),
            token: token.to_string(),
        };
        let app = Router::new()
            .route("/{project}/{key}", get(get_key).post(post_key))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            store,
            handle,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockKv {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn get_key(
    State(state): State<MockState>,
    Path((project, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &project, &headers) {
        return resp;
    }
    match state.store.get(&key).await {
        Ok(Some(bytes)) => (StatusCode::OK, bytes).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "key not found"),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, &err.to_string()),
    }
}

async fn post_key(
    State(state): State<MockState>,
    Path((project, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, &project, &headers) {
        return resp;
    }
    if params.get("op").map(String::as_str) != Some("append") {
        return error_response(StatusCode::BAD_REQUEST, "unsupported op");
    }
    match state.store.append(&key, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, &err.to_string()),
    }
}

fn authorize(state: &MockState, project: &str, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", state.token);
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return Err(error_response(StatusCode::UNAUTHORIZED, "invalid token"));
    }
    if project != state.project {
        return Err(error_response(StatusCode::NOT_FOUND, "project not found"));
    }
    Ok(())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
