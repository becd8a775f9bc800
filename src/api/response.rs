use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    SmartCache,
    Direct,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::SmartCache => "smart-cache",
            CacheStatus::Direct => "direct",
        }
    }
}

/// JSON body plus the diagnostics headers every `/rpc` answer carries.
pub fn rpc_response(
    status: StatusCode,
    body: impl Into<Body>,
    endpoint: &str,
    method: &str,
    cache_status: CacheStatus,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("X-Cache-Status", HeaderValue::from_static(cache_status.as_str()));
    // Caller-supplied names may not be valid header text
    if let Ok(value) = HeaderValue::from_str(endpoint) {
        headers.insert("X-RPC-Endpoint-Used", value);
    }
    if let Ok(value) = HeaderValue::from_str(method) {
        headers.insert("X-RPC-Method", value);
    }

    (status, headers, body.into()).into_response()
}

/// Admin payload stamped with the current time.
pub fn timestamped(fields: Value) -> Response {
    let mut body = match fields {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    body.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));

    (StatusCode::OK, Json(Value::Object(body))).into_response()
}
