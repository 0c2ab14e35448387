use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Router, body::Bytes};
use kvseries_core::Report;
use kvseries_store::{Appender, KvStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

#[derive(Clone)]
pub struct IngestState<S> {
    /// `None` when no KV credential is configured: reports are acknowledged
    /// and dropped.
    pub appender: Option<Appender<S>>,
}

pub fn router<S: KvStore>(appender: Option<Appender<S>>) -> Router {
    let state = IngestState { appender };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/", post(ingest_reports::<S>))
        .route("/v1/reports", post(ingest_reports::<S>))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Parses a JSON array of reports and acknowledges it. Persistence runs
/// afterwards in its own task, so append failures never reach the caller.
async fn ingest_reports<S: KvStore>(
    State(state): State<IngestState<S>>,
    body: Bytes,
) -> Response {
    let reports: Vec<Report> = match serde_json::from_slice(&body) {
        Ok(reports) => reports,
        Err(err) => {
            tracing::warn!(error = %err, "report payload decode failed");
            return (StatusCode::BAD_REQUEST, format!("{err}\n")).into_response();
        }
    };
    tracing::debug!(count = reports.len(), "report payload accepted");

    match state.appender {
        Some(appender) => {
            tokio::spawn(async move {
                let summary = appender.append_batch(&reports).await;
                if !summary.failed.is_empty() {
                    tracing::warn!(
                        appended = summary.appended,
                        failed = summary.failed.len(),
                        "report batch partially persisted"
                    );
                }
            });
        }
        None => {
            tracing::warn!(
                count = reports.len(),
                "no kv token configured; reports not persisted"
            );
        }
    }

    (StatusCode::OK, "ok\n").into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use kvseries_core::bucket::BucketZone;
    use kvseries_core::codec::decode_reports;
    use kvseries_store::{MemoryStore, StoreError};
    use tower::ServiceExt;

    use super::*;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn wait_for_keys(store: &MemoryStore, n: usize) {
        for _ in 0..100 {
            if store.keys().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} buckets, have {:?}", store.keys());
    }

    fn appender(store: &MemoryStore) -> Option<Appender<MemoryStore>> {
        Some(Appender::new(store.clone(), "ts", BucketZone::Utc))
    }

    #[tokio::test]
    async fn acknowledges_and_appends_each_report() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let payload = serde_json::to_string(&testkit::sample_day(day)).unwrap();

        let resp = router(appender(&store))
            .oneshot(post_json("/", &payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "ok\n");

        wait_for_keys(&store, 1).await;
        for _ in 0..100 {
            let stored = decode_reports(&store.raw("ts_2026_02_01").unwrap()).unwrap();
            if stored.len() == 2 {
                assert_eq!(stored, testkit::sample_day(day));
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("second report never appended");
    }

    #[tokio::test]
    async fn accepts_original_timestamp_field() {
        let store = MemoryStore::new();
        let payload = r#"[{"series":"temp","value":20.5,"metadata":{"room":"hall"},"timestamp":"2026-03-04T05:06:07Z"}]"#;
        let resp = router(appender(&store))
            .oneshot(post_json("/v1/reports", payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        wait_for_keys(&store, 1).await;
        assert_eq!(store.keys(), vec!["ts_2026_03_04"]);
    }

    #[tokio::test]
    async fn rejects_malformed_body_before_appending() {
        let store = MemoryStore::new();
        let resp = router(appender(&store))
            .oneshot(post_json("/", r#"{"series":"not a list"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(!body_text(resp).await.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn append_failures_do_not_reach_caller() {
        let store = MemoryStore::new();
        store.fail_key("ts_2026_02_01");
        let payload = serde_json::to_string(&vec![
            testkit::report("a", 1.0, testkit::at(1_769_940_000), &[]),
            testkit::report("b", 2.0, testkit::at(1_770_030_000), &[]),
        ])
        .unwrap();

        let resp = router(appender(&store))
            .oneshot(post_json("/", &payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        wait_for_keys(&store, 1).await;
        assert_eq!(store.keys(), vec!["ts_2026_02_02"]);
    }

    #[tokio::test]
    async fn without_appender_still_acknowledges() {
        let resp = router::<MemoryStore>(None)
            .oneshot(post_json("/", "[]"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[derive(Clone)]
    struct StuckStore;

    impl KvStore for StuckStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Ok(None)
        }

        async fn append(&self, _key: &str, _data: Bytes) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn acknowledgment_does_not_wait_for_store() {
        let app = router(Some(Appender::new(StuckStore, "ts", BucketZone::Utc)));
        let payload = serde_json::to_string(&testkit::sample_day(
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        ))
        .unwrap();

        let resp = tokio::time::timeout(
            Duration::from_secs(2),
            app.oneshot(post_json("/", &payload)),
        )
        .await
        .expect("ingest waited on the store")
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
