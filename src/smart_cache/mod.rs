//! Cache-aware, rate-limited RPC calls plus background prefetching of hot keys.

pub mod prefetch;

pub use prefetch::{Activity, PrefetchContext, PrefetchReport, PrefetchTarget, TargetOwner, WarmReport};

use crate::cache::{cache_on_the_fly, CacheKey, CacheOptions, RpcCache};
use crate::config::{CacheStrategy, Config, ConfigError, SharedRateLimitConfig, StrategyUpdate};
use crate::rate_limit::{ProviderStatus, RateLimitError, RateLimiter};
use crate::scheduler::Scheduler;
use crate::upstream::{UpstreamClient, UpstreamError};
use prefetch::PrefetchRegistry;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Endpoint label used for limiter bookkeeping when the caller gives none.
pub const DEFAULT_ENDPOINT: &str = "default";

/// Methods that change chain state and must never be served from cache.
const MUTATING_METHODS: &[&str] = &["sendTransaction"];

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("No upstream URL configured for provider {0}")]
    NoUpstream(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub skip_cache: bool,
    /// Fetch even on a fresh hit, and store the result.
    pub force_fresh: bool,
    pub endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCacheStats {
    pub strategies: BTreeMap<String, CacheStrategy>,
    pub active_prefetches: Vec<String>,
    pub rate_limiter_status: BTreeMap<String, ProviderStatus>,
}

struct Inner {
    config: SharedRateLimitConfig,
    cache: Arc<RpcCache>,
    limiter: RateLimiter,
    upstream: UpstreamClient,
    scheduler: Arc<dyn Scheduler>,
    provider_urls: HashMap<String, String>,
    primary_provider: String,
    registry: Mutex<PrefetchRegistry>,
}

#[derive(Clone)]
pub struct SmartCache {
    inner: Arc<Inner>,
}

impl SmartCache {
    pub fn new(
        config: &Config,
        rate_config: SharedRateLimitConfig,
        cache: Arc<RpcCache>,
        limiter: RateLimiter,
        upstream: UpstreamClient,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let provider_urls = config
            .rate_limits
            .providers
            .keys()
            .filter_map(|provider| {
                config
                    .provider_url(provider)
                    .map(|url| (provider.clone(), url.to_string()))
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                config: rate_config,
                cache,
                limiter,
                upstream,
                scheduler,
                provider_urls,
                primary_provider: config.primary_provider().to_string(),
                registry: Mutex::new(PrefetchRegistry::default()),
            }),
        }
    }

    pub fn primary_provider(&self) -> &str {
        &self.inner.primary_provider
    }

    /// Serve `method` from cache when its strategy allows, otherwise call the
    /// provider through the rate limiter.
    pub async fn smart_rpc_call(
        &self,
        provider: &str,
        method: &str,
        params: &Value,
        options: CallOptions,
    ) -> Result<Value, GatewayError> {
        let strategy = self.inner.config.read().await.strategy(method);
        let endpoint = options.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        if options.skip_cache || !strategy.enabled || MUTATING_METHODS.contains(&method) {
            debug!("Bypassing cache for {} on {}", method, provider);
            return self.execute(provider, method, params, endpoint).await;
        }

        let key = CacheKey::rpc_call(provider, method, params).to_string();
        let cache_options = if options.force_fresh {
            CacheOptions::refresh(Some(strategy.ttl()))
        } else {
            CacheOptions::ttl(strategy.ttl())
        };

        cache_on_the_fly(
            &self.inner.cache,
            &key,
            || self.execute(provider, method, params, endpoint),
            cache_options,
        )
        .await
        .inspect_err(|err| warn!("Smart cache call {} on {} failed: {}", method, provider, err))
    }

    async fn execute(
        &self,
        provider: &str,
        method: &str,
        params: &Value,
        endpoint: &str,
    ) -> Result<Value, GatewayError> {
        let url = self
            .inner
            .provider_urls
            .get(provider)
            .cloned()
            .ok_or_else(|| GatewayError::NoUpstream(provider.to_string()))?;

        let upstream = self.inner.upstream.clone();
        let method = method.to_string();
        let params = params.clone();

        self.inner
            .limiter
            .queue_request(provider, endpoint, move || async move {
                upstream
                    .call(&url, &method, &params)
                    .await
                    .map_err(GatewayError::from)
            })
            .await
    }

    pub async fn update_strategy(&self, method: &str, update: StrategyUpdate) -> Result<(), ConfigError> {
        self.inner.config.write().await.update_strategy(method, update)?;
        debug!("Updated cache strategy for {}", method);
        Ok(())
    }

    pub async fn stats(&self) -> SmartCacheStats {
        let strategies = self.inner.config.read().await.caching_strategies.clone();

        let mut rate_limiter_status = BTreeMap::new();
        for provider in ["syndica", "helius"] {
            if let Ok(status) = self.inner.limiter.status(provider).await {
                rate_limiter_status.insert(provider.to_string(), status);
            }
        }

        SmartCacheStats {
            strategies,
            active_prefetches: self.active_target_keys().await,
            rate_limiter_status,
        }
    }
}
