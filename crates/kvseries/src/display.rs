use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use kvseries_core::filter::{LabelFilter, ReportFilter};
use kvseries_core::query::{RangeRequest, RangeResponse};
use kvseries_core::time::{format_day, parse_day};
use kvseries_core::window::{DayRange, QueryWindow};
use kvseries_store::{KvStore, RangeReader};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Clone)]
pub struct DisplayState<S> {
    pub reader: RangeReader<S>,
    pub group: Option<String>,
    pub lookback: Duration,
}

/// Resolves the request's days into a window, reads it and shapes the
/// response the display surfaces hand out.
pub async fn range_response<S: KvStore>(
    state: &DisplayState<S>,
    request: &RangeRequest,
) -> kvseries_core::Result<RangeResponse> {
    let zone = state.reader.zone();
    let window = QueryWindow::resolve(request.range, Utc::now(), zone, state.lookback)?;
    let outcome = state.reader.query(&window, &request.filter).await;
    tracing::debug!(
        start = %window.start,
        end = %window.end,
        reports = outcome.reports.len(),
        buckets = outcome.buckets.len(),
        "range query served"
    );

    Ok(RangeResponse {
        group: state.group.clone(),
        date_start: format_day(zone.day_of(window.start)),
        date_end: format_day(zone.day_of(window.end)),
        reports: outcome.reports,
        buckets: outcome.buckets,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportsParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub series: Option<String>,
    pub labels: Option<String>,
}

impl ReportsParams {
    pub fn into_request(self) -> kvseries_core::Result<RangeRequest> {
        let range = DayRange {
            start: self.start.as_deref().map(parse_day).transpose()?,
            end: self.end.as_deref().map(parse_day).transpose()?,
        };
        let labels = match self.labels.as_deref() {
            Some(raw) => LabelFilter::parse_list(raw)?,
            None => Vec::new(),
        };
        Ok(RangeRequest {
            range,
            filter: ReportFilter {
                series: self.series.filter(|s| !s.is_empty()),
                labels,
            },
        })
    }
}

pub fn router<S: KvStore>(state: DisplayState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/", get(get_reports::<S>))
        .route("/v1/reports", get(get_reports::<S>))
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn run_display_server<S: KvStore>(
    state: DisplayState<S>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind display listener on {addr}"))?;
    tracing::info!(addr = %addr, "display server listening");
    axum::serve(listener, router(state))
        .await
        .context("display server failed")
}

async fn get_reports<S: KvStore>(
    State(state): State<DisplayState<S>>,
    Query(params): Query<ReportsParams>,
) -> Response {
    let request = match params.into_request() {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };
    match range_response(&state, &request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use kvseries_core::bucket::BucketZone;
    use kvseries_core::codec::encode_reports;
    use kvseries_store::MemoryStore;
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    fn state(store: &MemoryStore) -> DisplayState<MemoryStore> {
        DisplayState {
            reader: RangeReader::new(store.clone(), "ts", BucketZone::Utc),
            group: Some("garden".into()),
            lookback: Duration::from_secs(7 * 86_400),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seed(store: &MemoryStore) {
        let day1 = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let day3 = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        store.put_raw(
            "ts_2026_02_01",
            encode_reports(&testkit::sample_day(day1)).to_vec(),
        );
        store.put_raw(
            "ts_2026_02_03",
            encode_reports(&testkit::sample_day(day3)).to_vec(),
        );
    }

    #[tokio::test]
    async fn serves_reports_for_day_range() {
        let store = MemoryStore::new();
        seed(&store);

        let (status, body) = get_json(
            router(state(&store)),
            "/v1/reports?start=2026-02-01&end=2026-02-03",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["group"], "garden");
        assert_eq!(body["date_start"], "2026-02-01");
        assert_eq!(body["date_end"], "2026-02-03");
        assert_eq!(body["reports"].as_array().unwrap().len(), 4);
        assert_eq!(body["reports"][0]["series"], "cpu");
        assert_eq!(body["reports"][0]["ts"], "2026-02-01T09:00:00Z");
        assert_eq!(body["buckets"][1]["status"], "missing");
    }

    #[tokio::test]
    async fn filters_by_series_and_labels() {
        let store = MemoryStore::new();
        seed(&store);

        let (_, body) = get_json(
            router(state(&store)),
            "/?start=2026-02-01&end=2026-02-03&labels=host%3Da",
        )
        .await;
        let reports = body["reports"].as_array().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r["series"] == "cpu"));

        let (_, body) = get_json(
            router(state(&store)),
            "/?start=2026-02-01&end=2026-02-01&series=mem",
        )
        .await;
        assert_eq!(body["reports"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_dates() {
        let store = MemoryStore::new();
        let (status, body) = get_json(router(state(&store)), "/?end=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("YYYY-MM-DD"));

        let (status, _) = get_json(
            router(state(&store)),
            "/?start=2026-02-05&end=2026-02-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn favicon_is_not_found() {
        let resp = router(state(&MemoryStore::new()))
            .oneshot(
                Request::builder()
                    .uri("/favicon.ico")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn requests_are_traced_at_info() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (status, _) = get_json(
            router(state(&MemoryStore::new())),
            "/?start=2026-02-01&end=2026-02-01",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("started processing request"), "{logs}");
        assert!(logs.contains("finished processing request"), "{logs}");
    }
}
