pub mod aside;
pub mod keys;
pub mod ttl;

pub use aside::{cache_on_the_fly, CacheOptions};
pub use keys::CacheKey;
pub use ttl::{CacheStats, TtlCache};

use crate::config::Config;
use serde_json::Value;

/// Process-wide store of RPC results.
pub type RpcCache = TtlCache<Value>;

pub fn init_cache(config: &Config) -> RpcCache {
    TtlCache::with_switch(config.cache_max_size, config.cache_default_ttl, config.cache_enabled)
}
