use crate::cache::{self, RpcCache};
use crate::config::{Config, ConfigError, SchedulerMode};
use crate::rate_limit::RateLimiter;
use crate::scheduler::{job, ManualScheduler, Scheduler, TokioScheduler};
use crate::smart_cache::SmartCache;
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::usage::UsageTracker;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),
}

pub struct AppState {
    pub config: Config,
    pub cache: Arc<RpcCache>,
    pub limiter: RateLimiter,
    pub upstream: UpstreamClient,
    pub smart_cache: SmartCache,
    pub scheduler: Arc<dyn Scheduler>,
    pub usage: Arc<UsageTracker>,
}

impl AppState {
    pub fn new(config: Config, scheduler: Arc<dyn Scheduler>) -> Result<Self, StateError> {
        config.validate()?;

        let rate_config = config.rate_limits.clone().into_shared();
        let cache = Arc::new(cache::init_cache(&config));
        let limiter = RateLimiter::new(rate_config.clone(), config.queue_capacity);
        let upstream = UpstreamClient::new(config.upstream_timeout)?;
        let smart_cache = SmartCache::new(
            &config,
            rate_config,
            cache.clone(),
            limiter.clone(),
            upstream.clone(),
            scheduler.clone(),
        );

        Ok(Self {
            config,
            cache,
            limiter,
            upstream,
            smart_cache,
            scheduler,
            usage: Arc::new(UsageTracker::new()),
        })
    }

    /// State with the scheduler selected by `config.scheduler_mode`.
    pub fn from_config(config: Config) -> Result<Self, StateError> {
        let scheduler: Arc<dyn Scheduler> = match config.scheduler_mode {
            SchedulerMode::Tokio => Arc::new(TokioScheduler::new()),
            SchedulerMode::Manual => Arc::new(ManualScheduler::new()),
        };
        Self::new(config, scheduler)
    }

    /// Register the cache sweep, limiter maintenance and baseline prefetching.
    pub async fn start_background(&self) {
        let sweep_cache = self.cache.clone();
        self.scheduler.every(
            "cache-cleanup",
            self.config.cache_cleanup_interval,
            job(move || {
                let cache = sweep_cache.clone();
                async move {
                    let removed = cache.cleanup().await;
                    if removed > 0 {
                        debug!("Cache cleanup removed {} expired entries", removed);
                    }
                }
            }),
        );

        self.limiter.start_maintenance(self.scheduler.as_ref());
        self.smart_cache.start_prefetching().await;
        info!("Background jobs started");
    }

    pub async fn shutdown(&self) {
        self.smart_cache.stop_prefetching().await;
        self.limiter.shutdown();
        self.scheduler.shutdown();
        info!("Background jobs stopped");
    }
}
