pub mod rate_limiter_tests;

use crate::{config::Config, scheduler::ManualScheduler, state::AppState};
use std::sync::Arc;

pub const VALID_WALLET: &str = "9ii1FEiWSgDzXAbwj2oTmJXzkfCw78mnHwPQv9WQ5iTn";
pub const VALID_WALLET_2: &str = "AhAkbf3cGD6HkFod2rBEE8mie8ks9p7vuss6WGkUFAM9";
pub const VALID_GAME_ADDRESS: &str = "FwKc3s5x7SguXzNPPJP7AV2UUhCF4rnEQCFdA2Q8NGCi";
pub const VALID_GAME_ADDRESS_2: &str = "424CJUQd2RQWNgygWbNpRmQStZ77Mea2f29CATe8M2hS";

/// Defaults with every endpoint pointed at `upstream_url` and baseline
/// prefetching off, so tests control all upstream traffic.
pub fn test_config(upstream_url: &str) -> Config {
    let mut config = Config::default();
    for endpoint in &mut config.endpoints {
        endpoint.url = upstream_url.to_string();
    }
    config.rate_limits.prefetch.enabled = false;
    config
}

/// State driven by a manual scheduler: nothing runs unless a test asks.
pub fn test_state(config: Config) -> Arc<AppState> {
    Arc::new(AppState::new(config, Arc::new(ManualScheduler::new())).expect("valid test config"))
}
