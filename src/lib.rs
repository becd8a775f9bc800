pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod rate_limit;
pub mod scheduler;
pub mod smart_cache;
pub mod state;
pub mod upstream;
pub mod usage;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use api::error::ApiError;
pub use api::route::create_router;
pub use cache::{cache_on_the_fly, CacheOptions, RpcCache, TtlCache};
pub use config::{Config, RateLimitConfig};
pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimiter};
pub use smart_cache::{CallOptions, GatewayError, SmartCache};
pub use state::AppState;
pub use validation::validate_solana_address;
