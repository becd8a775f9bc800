use crate::{
    api::{admin, rpc, usage},
    state::AppState,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

pub const RPC_ENDPOINT_HEADER: &str = "x-rpc-endpoint";
pub const SKIP_CACHE_HEADER: &str = "x-skip-cache";
pub const FORCE_FRESH_HEADER: &str = "x-force-fresh";

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::OPTIONS, Method::GET, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(RPC_ENDPOINT_HEADER),
            HeaderName::from_static(SKIP_CACHE_HEADER),
            HeaderName::from_static(FORCE_FRESH_HEADER),
        ])
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.allowed_origins);

    Router::new()
        .route("/rpc", post(rpc::proxy).options(rpc::preflight))
        .route("/prefetch/intelligent", post(admin::intelligent_prefetch))
        .route("/admin/rate-status", get(admin::rate_status))
        .route("/admin/cache-stats", get(admin::cache_stats))
        .route("/admin/usage-metrics", get(usage::usage_metrics))
        .route("/admin/cache-clear", post(admin::cache_clear))
        .route("/admin/cache-warm", post(admin::cache_warm))
        .route("/admin/tick", post(admin::tick))
        .route("/admin/prefetch/user", post(admin::add_user_prefetch))
        .route("/admin/prefetch/user/{wallet}", delete(admin::remove_user_prefetch))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), usage::track_usage))
        .layer(cors)
        .with_state(app_state)
}
