use rpc_gateway_service::{
    config::{Config, RateLimitConfig},
    rate_limit::RateLimiter,
    scheduler::ManualScheduler,
    state::AppState,
};
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting rate limiter checks...");

    let mut config = Config::from_env();
    // Nothing here should reach a real provider
    config.rate_limits.prefetch.enabled = false;
    let state = AppState::new(config, Arc::new(ManualScheduler::new()))?;

    // Test 1: single admission per provider
    info!("Test 1: Basic rate limit checking");
    for provider in ["syndica", "helius"] {
        match state.limiter.check_limit(provider, "test-endpoint").await {
            Ok(decision) => info!(
                "{}: allowed={} current_rps={:.2} monthly_usage={} rps_remaining={:.2}",
                provider, decision.allowed, decision.current_rps, decision.monthly_usage, decision.rps_remaining
            ),
            Err(err) => error!("{} limit check failed: {}", provider, err),
        }
    }

    // Test 2: status report
    info!("Test 2: Status monitoring");
    for (provider, status) in state.limiter.status_all().await {
        info!(
            "{}: status={:?} current_rps={:.2} monthly_usage={} rps_limit={} monthly_limit={}",
            provider,
            status.status,
            status.current_rps,
            status.monthly_usage,
            status.limits.rps_limit,
            status.limits.monthly_limit
        );
    }

    // Test 3: strategies and prefetch registry
    info!("Test 3: Smart cache statistics");
    let stats = state.smart_cache.stats().await;
    info!(
        "{} strategies, {} active prefetches",
        stats.strategies.len(),
        stats.active_prefetches.len()
    );
    for method in ["getLatestBlockhash", "getSlot", "getBalance", "sendTransaction"] {
        if let Some(strategy) = stats.strategies.get(method) {
            info!(
                "  {}: ttl={}ms priority={:?} enabled={}",
                method, strategy.ttl_ms, strategy.priority, strategy.enabled
            );
        }
    }

    // Test 4: burst across endpoint keys on a fresh limiter
    info!("Test 4: Burst limit simulation");
    let limiter = RateLimiter::new(RateLimitConfig::from_env().into_shared(), 16);
    let rps_limit = limiter.status("helius").await?.limits.rps_limit as usize;
    let checks = (0..rps_limit + 5).map(|i| {
        let limiter = limiter.clone();
        async move { limiter.check_limit("helius", &format!("burst-test-{}", i % 5)).await }
    });
    let results = futures::future::join_all(checks).await;

    let mut allowed = 0;
    let mut blocked = Vec::new();
    for result in results {
        let decision = result?;
        if decision.allowed {
            allowed += 1;
        } else {
            blocked.push(decision);
        }
    }
    info!("Burst results: {} allowed, {} blocked", allowed, blocked.len());
    if let Some(first) = blocked.first() {
        info!("First blocked request should retry after {:?}s", first.retry_after_secs);
    }
    if allowed > rps_limit {
        error!("Admitted {} calls against a limit of {}", allowed, rps_limit);
    }

    // Test 5: configuration sanity
    info!("Test 5: Configuration validation");
    let rate_limits = &state.config.rate_limits;
    info!(
        "Providers: {}",
        rate_limits.providers.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    info!("Cache strategies: {}", rate_limits.caching_strategies.len());
    if let Some(syndica) = rate_limits.provider("syndica") {
        if syndica.rps_limit != 100 || syndica.monthly_limit != 10_000_000 {
            warn!("Syndica limits differ from the standard plan");
        }
    }
    if let Some(helius) = rate_limits.provider("helius") {
        if helius.rps_limit != 10 || helius.monthly_limit != 1_000_000 {
            warn!("Helius limits differ from the free plan");
        }
    }
    match rate_limits.validate() {
        Ok(()) => info!("Configuration validation passed"),
        Err(err) => error!("Configuration validation failed: {}", err),
    }

    state.shutdown().await;
    info!("Rate limiter checks completed");
    Ok(())
}
