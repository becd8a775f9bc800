use crate::config::ConfigError;
use crate::rate_limit::{RateLimitDecision, RateLimitError};
use crate::smart_cache::GatewayError;
use crate::validation::ValidationError;
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid RPC endpoint specified: {requested}")]
    InvalidEndpoint { requested: String, available: Vec<String> },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited(Box<RateLimitDecision>),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn rate_limited(decision: &RateLimitDecision) -> Response {
        // Monthly denials carry no retry hint; wait for the reset instead.
        let retry_after = decision.retry_after_secs.unwrap_or_else(|| {
            let millis = decision.monthly_reset_at_millis - Utc::now().timestamp_millis();
            (millis.max(1000) as u64).div_ceil(1000)
        });

        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from(retry_after));
        headers.insert(
            "X-RateLimit-Monthly-Remaining",
            HeaderValue::from(decision.monthly_remaining),
        );
        headers.insert(
            "X-RateLimit-Reset",
            HeaderValue::from(decision.monthly_reset_at_millis),
        );

        let body = Json(json!({
            "error": "Rate limit exceeded",
            "retryAfter": retry_after,
            "decision": decision,
        }));

        (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidEndpoint { available, .. } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid RPC endpoint specified",
                    "availableEndpoints": available,
                }),
            ),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() })),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
            ApiError::RateLimited(decision) => return Self::rate_limited(decision),
            ApiError::ProviderUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": self.to_string() }))
            }
            ApiError::Upstream(message) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "RPC proxy error", "message": message }),
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error", "message": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RateLimit(err) => err.into(),
            GatewayError::Upstream(err) => ApiError::Upstream(err.to_string()),
            GatewayError::NoUpstream(provider) => ApiError::ProviderUnavailable(provider),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Limited { decision, .. } | RateLimitError::QueueFull { decision, .. } => {
                ApiError::RateLimited(decision)
            }
            RateLimitError::UnknownOrDisabledProvider(provider) => ApiError::ProviderUnavailable(provider),
            RateLimitError::QueueClosed => ApiError::Internal(RateLimitError::QueueClosed.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownProvider(_) | ConfigError::UnknownStrategy(_) => {
                ApiError::NotFound(err.to_string())
            }
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn into_parts(err: ApiError) -> (StatusCode, HeaderMap, Value) {
        let response = err.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_error_keeps_its_message() {
        let (status, _, body) = into_parts(RateLimitError::QueueClosed.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["message"], "Request queue closed before the call ran");
    }

    #[tokio::test]
    async fn unknown_strategy_is_not_found() {
        let (status, _, body) = into_parts(ConfigError::UnknownStrategy("getFoo".to_string()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("getFoo"));
    }

    #[tokio::test]
    async fn rps_denial_carries_retry_after() {
        let decision = RateLimitDecision {
            allowed: false,
            retry_after_secs: Some(2),
            queue_position: None,
            current_rps: 10.0,
            monthly_usage: 40,
            rps_remaining: 0.0,
            monthly_remaining: 60,
            monthly_reset_at_millis: 1_700_000_000_000,
        };
        let (status, headers, body) = into_parts(ApiError::RateLimited(Box::new(decision))).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers["retry-after"], "2");
        assert_eq!(headers["x-ratelimit-monthly-remaining"], "60");
        assert_eq!(headers["x-ratelimit-reset"], "1700000000000");
        assert_eq!(body["retryAfter"], 2);
    }
}
