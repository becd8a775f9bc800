use crate::models::{JsonRpcRequest, JsonRpcResponse};
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("RPC request failed: HTTP {0}")]
    Http(StatusCode),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed upstream response: {0}")]
    Decode(String),
}

/// Raw upstream answer for pass-through calls.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// JSON-RPC over HTTP POST with a hard per-call deadline.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        info!("Initializing upstream client with timeout {:?}", timeout);

        Ok(Self {
            http,
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, UpstreamError>
    where
        F: std::future::Future<Output = Result<T, UpstreamError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }

    /// Call `method` and return its `result` member.
    ///
    /// Non-2xx statuses and JSON-RPC `error` members are both failures.
    pub async fn call(&self, url: &str, method: &str, params: &Value) -> Result<Value, UpstreamError> {
        let request = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params.clone());

        self.with_deadline(async {
            let response = self.http.post(url).json(&request).send().await.map_err(|err| self.map_reqwest(err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Http(status));
            }

            let body: JsonRpcResponse = response
                .json()
                .await
                .map_err(|err| UpstreamError::Decode(err.to_string()))?;

            if let Some(error) = body.error {
                return Err(UpstreamError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }

            debug!("Upstream answered {}", method);
            Ok(body.result.unwrap_or(Value::Null))
        })
        .await
    }

    /// POST `body` unchanged and hand back whatever the upstream answered.
    pub async fn forward(&self, url: &str, body: Bytes) -> Result<ForwardedResponse, UpstreamError> {
        self.with_deadline(async {
            let response = self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|err| self.map_reqwest(err))?;

            let status = response.status();
            let body = response.bytes().await.map_err(|err| self.map_reqwest(err))?;
            Ok(ForwardedResponse { status, body })
        })
        .await
    }

    fn map_reqwest(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Transport(err)
        }
    }
}
