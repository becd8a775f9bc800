//! "Compute once, cache, reuse" on top of `TtlCache`.
//!
//! Concurrent misses for the same key are not coalesced: every caller that
//! misses runs its own fetcher. The rate limiter is what bounds upstream load.

use super::ttl::TtlCache;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// TTL for the stored value; the cache default when `None`.
    pub ttl: Option<Duration>,
    /// Always fetch; never read or write the cache.
    pub skip_cache: bool,
    /// Always fetch and overwrite whatever is cached.
    pub force_refresh: bool,
}

impl CacheOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }

    pub fn refresh(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            force_refresh: true,
            ..Self::default()
        }
    }
}

/// Return the cached value for `key`, or run `fetcher` and cache its result.
///
/// Fetch errors are returned as-is and nothing is cached for them.
pub async fn cache_on_the_fly<V, E, F, Fut>(
    cache: &TtlCache<V>,
    key: &str,
    fetcher: F,
    options: CacheOptions,
) -> Result<V, E>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    if options.skip_cache {
        return fetcher().await;
    }

    if !options.force_refresh {
        if let Some(value) = cache.get(key).await {
            debug!("Cache hit for key: {}", key);
            return Ok(value);
        }
        debug!("Cache miss for key: {}", key);
    }

    let value = fetcher().await?;
    cache.set(key, value.clone(), options.ttl).await;
    Ok(value)
}
