use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::StoreError;
use crate::kv::KvStore;

#[derive(Debug, Clone)]
pub struct HttpKvConfig {
    pub endpoint: String,
    pub project: String,
    pub token: String,
    pub timeout: Duration,
}

/// `KvStore` over the KV service's HTTP API:
/// `GET {endpoint}/{project}/{key}` and
/// `POST {endpoint}/{project}/{key}?op=append`, both bearer authenticated.
#[derive(Clone)]
pub struct HttpKvStore {
    client: Client,
    endpoint: String,
    project: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpKvStore {
    pub fn new(cfg: HttpKvConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            project: cfg.project,
            token: cfg.token,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.project, key)
    }
}

impl KvStore for HttpKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let response = self
            .client
            .get(self.url(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        Ok(Some(body))
    }

    async fn append(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!("{}?op=append", self.url(key)))
            .bearer_auth(&self.token)
            .header("content-type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map_err(transport)?;
        Err(rejected(status, &body))
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn rejected(status: StatusCode, body: &[u8]) -> StoreError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    StoreError::Rejected {
        status: status.as_u16(),
        message,
    }
}
