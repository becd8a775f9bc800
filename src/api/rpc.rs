use crate::{
    api::{
        error::ApiError,
        response::{rpc_response, CacheStatus},
        route::{FORCE_FRESH_HEADER, RPC_ENDPOINT_HEADER, SKIP_CACHE_HEADER},
    },
    models::{JsonRpcRequest, JsonRpcResponse},
    smart_cache::{CallOptions, GatewayError},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

const UNKNOWN_METHOD: &str = "unknown";

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

// OPTIONS /rpc outside a CORS preflight
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

// POST /rpc handler
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let requested = headers
        .get(RPC_ENDPOINT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(state.config.primary_endpoint.as_str())
        .to_string();

    let endpoint = state
        .config
        .endpoint(&requested)
        .cloned()
        .ok_or_else(|| ApiError::InvalidEndpoint {
            requested: requested.clone(),
            available: state.config.endpoint_names(),
        })?;

    // Anything that is not a single JSON-RPC call goes straight through
    let request = serde_json::from_slice::<JsonRpcRequest>(&body).ok();
    let method = request
        .as_ref()
        .map_or(UNKNOWN_METHOD, |request| request.method.as_str())
        .to_string();

    if let (true, Some(request)) = (endpoint.smart_cache, request) {
        let options = CallOptions {
            skip_cache: header_flag(&headers, SKIP_CACHE_HEADER),
            force_fresh: header_flag(&headers, FORCE_FRESH_HEADER),
            endpoint: Some(endpoint.name.clone()),
        };

        match state
            .smart_cache
            .smart_rpc_call(&endpoint.provider, &request.method, &request.params, options)
            .await
        {
            Ok(result) => {
                let body = serde_json::to_vec(&JsonRpcResponse::success(request.id, result))
                    .map_err(|err| ApiError::Internal(err.to_string()))?;
                return Ok(rpc_response(
                    StatusCode::OK,
                    body,
                    &endpoint.name,
                    &method,
                    CacheStatus::SmartCache,
                ));
            }
            Err(err @ (GatewayError::Upstream(_) | GatewayError::NoUpstream(_))) => {
                warn!("Smart cache error, falling back to direct call: {}", err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    debug!("Forwarding {} directly to {}", method, endpoint.name);
    let forwarded = state.upstream.forward(&endpoint.url, body).await.map_err(|err| {
        error!("RPC proxy error on {}: {}", endpoint.name, err);
        ApiError::from(GatewayError::Upstream(err))
    })?;

    Ok(rpc_response(
        forwarded.status,
        forwarded.body,
        &endpoint.name,
        &method,
        CacheStatus::Direct,
    ))
}
