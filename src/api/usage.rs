use crate::{
    api::response::timestamped,
    state::AppState,
    usage::{UsageCategory, UsageRecord},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

const ENDPOINT_USED_HEADER: &str = "x-rpc-endpoint-used";

fn categorize(path: &str) -> UsageCategory {
    match path {
        "/rpc" => UsageCategory::Rpc,
        "/admin/rate-status" | "/admin/cache-stats" | "/admin/usage-metrics" => UsageCategory::Monitoring,
        path if path.starts_with("/prefetch") || path.starts_with("/admin/prefetch") => UsageCategory::Prefetch,
        _ => UsageCategory::Admin,
    }
}

/// Records one `UsageRecord` per routed request. RPC calls are keyed by the
/// upstream endpoint that served them.
pub async fn track_usage(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let path = request.uri().path().to_string();
    let category = categorize(&path);

    let response = next.run(request).await;

    let endpoint = match category {
        UsageCategory::Rpc => response
            .headers()
            .get(ENDPOINT_USED_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("rpc")
            .to_string(),
        _ => path,
    };
    let success = response.status().is_success();
    debug!(
        "{} call to {} finished with {}",
        category.as_str(),
        endpoint,
        response.status()
    );

    state
        .usage
        .track(UsageRecord {
            at: Instant::now(),
            endpoint,
            category,
            success,
            response_time: started.elapsed(),
        })
        .await;

    response
}

// GET /admin/usage-metrics
pub async fn usage_metrics(State(state): State<Arc<AppState>>) -> Response {
    let metrics = state.usage.metrics().await;
    timestamped(json!(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_categories() {
        assert_eq!(categorize("/rpc"), UsageCategory::Rpc);
        assert_eq!(categorize("/admin/cache-stats"), UsageCategory::Monitoring);
        assert_eq!(categorize("/admin/prefetch/user/abc"), UsageCategory::Prefetch);
        assert_eq!(categorize("/prefetch/intelligent"), UsageCategory::Prefetch);
        assert_eq!(categorize("/admin/cache-clear"), UsageCategory::Admin);
    }
}
