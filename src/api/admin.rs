// Operational endpoints over the limiter, the cache and the prefetch registry

use crate::{
    api::{error::ApiError, response::timestamped},
    smart_cache::PrefetchContext,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
pub struct UserPrefetchRequest {
    wallet: String,
}

// GET /admin/rate-status
pub async fn rate_status(State(state): State<Arc<AppState>>) -> Response {
    let status = state.limiter.status_all().await;
    timestamped(json!({ "status": status }))
}

// GET /admin/cache-stats
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Response {
    let cache = state.cache.stats().await;
    let stats = state.smart_cache.stats().await;
    timestamped(json!({ "cache": cache, "stats": stats }))
}

// POST /admin/cache-clear
pub async fn cache_clear(State(state): State<Arc<AppState>>) -> Response {
    state.cache.clear().await;
    info!("Cache cleared by admin request");
    timestamped(json!({ "ok": true }))
}

// POST /admin/cache-warm
pub async fn cache_warm(State(state): State<Arc<AppState>>) -> Response {
    let report = state.smart_cache.warm().await;
    timestamped(json!({ "ok": true, "warmed": report }))
}

// POST /admin/tick: one pass of every scheduled job, for cron-driven hosts
pub async fn tick(State(state): State<Arc<AppState>>) -> Response {
    let jobs = state.scheduler.run_all().await;
    timestamped(json!({ "ok": true, "jobs": jobs }))
}

// POST /admin/prefetch/user
pub async fn add_user_prefetch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserPrefetchRequest>,
) -> Result<Response, ApiError> {
    let added = state.smart_cache.add_user_targets(&request.wallet).await?;
    Ok(timestamped(json!({ "ok": true, "added": added })))
}

// DELETE /admin/prefetch/user/{wallet}
pub async fn remove_user_prefetch(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
) -> Response {
    let removed = state.smart_cache.remove_user_targets(&wallet).await;
    timestamped(json!({ "ok": true, "removed": removed }))
}

// POST /prefetch/intelligent
pub async fn intelligent_prefetch(
    State(state): State<Arc<AppState>>,
    Json(context): Json<PrefetchContext>,
) -> Result<Response, ApiError> {
    let report = state.smart_cache.intelligent_prefetch(context).await?;
    Ok(timestamped(json!({
        "success": true,
        "message": "Intelligent prefetch configured",
        "configured": report,
    })))
}
