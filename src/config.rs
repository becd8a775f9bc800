// Configuration for the gateway:
// - Server listening address/port and allowed CORS origins
// - Upstream endpoint table (logical name -> provider URL)
// - Provider rate limits and per-method cache strategies
// - Cache and prefetch switches

use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

/// Rate limits and cache strategies shared by the limiter and the smart cache.
///
/// Updates go through the lock and are visible to the next admission check.
pub type SharedRateLimitConfig = Arc<RwLock<RateLimitConfig>>;

pub const DEFAULT_STRATEGY: &str = "default";

const DEFAULT_GAME_PROGRAM_ID: &str = "6o1iE4cKQcjW4UFd4vn35r43qD9LjNDhPGNUMBuS8ocZ";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Provider {0} is enabled but has a zero rps limit")]
    ZeroRpsLimit(String),

    #[error("Provider {0} is enabled but has a zero monthly limit")]
    ZeroMonthlyLimit(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown cache strategy: {0}")]
    UnknownStrategy(String),

    #[error("Primary endpoint {0} is not in the endpoint table")]
    UnknownPrimaryEndpoint(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Syndica,
    Helius,
    Public,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub rps_limit: u32,
    pub monthly_limit: u64,
    pub provider: ProviderKind,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,
}

/// Partial update applied by `RateLimitConfig::update_provider`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub rps_limit: Option<u32>,
    pub monthly_limit: Option<u64>,
    pub enabled: Option<bool>,
    pub fallback_provider: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStrategy {
    pub ttl_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_ms: Option<u64>,
    pub prefetch: bool,
    pub priority: Priority,
    pub enabled: bool,
}

impl CacheStrategy {
    fn new(ttl_ms: u64, priority: Priority) -> Self {
        Self {
            ttl_ms,
            max_age_ms: None,
            prefetch: false,
            priority,
            enabled: true,
        }
    }

    fn with_max_age(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = Some(max_age_ms);
        self
    }

    fn prefetched(mut self) -> Self {
        self.prefetch = true;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Partial update applied by `RateLimitConfig::update_strategy`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyUpdate {
    pub ttl_ms: Option<u64>,
    pub max_age_ms: Option<u64>,
    pub priority: Option<Priority>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchSettings {
    pub enabled: bool,
    pub intelligent_prefetch: bool,
    pub game_transaction_prefetch: bool,
    pub user_pattern_prefetch: bool,
    pub game_program_id: String,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            intelligent_prefetch: true,
            game_transaction_prefetch: true,
            user_pattern_prefetch: true,
            game_program_id: DEFAULT_GAME_PROGRAM_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub providers: BTreeMap<String, ProviderConfig>,
    pub caching_strategies: BTreeMap<String, CacheStrategy>,
    pub prefetch: PrefetchSettings,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "syndica".to_string(),
            ProviderConfig {
                rps_limit: 100,
                monthly_limit: 10_000_000,
                provider: ProviderKind::Syndica,
                enabled: true,
                fallback_provider: Some("helius".to_string()),
            },
        );
        providers.insert(
            "helius".to_string(),
            ProviderConfig {
                rps_limit: 10,
                monthly_limit: 1_000_000,
                provider: ProviderKind::Helius,
                enabled: true,
                fallback_provider: Some("ankr".to_string()),
            },
        );
        providers.insert(
            "ankr".to_string(),
            ProviderConfig {
                rps_limit: 5,
                monthly_limit: 100_000,
                provider: ProviderKind::Public,
                enabled: true,
                fallback_provider: None,
            },
        );
        providers.insert(
            "solana".to_string(),
            ProviderConfig {
                rps_limit: 2,
                monthly_limit: 50_000,
                provider: ProviderKind::Public,
                enabled: true,
                fallback_provider: None,
            },
        );

        use Priority::*;
        let strategies = [
            // Chain tip moves every ~400ms
            ("getSlot", CacheStrategy::new(60_000, High).prefetched()),
            ("getBlockHeight", CacheStrategy::new(60_000, High).prefetched()),
            (
                "getLatestBlockhash",
                CacheStrategy::new(30_000, High).with_max_age(300_000).prefetched(),
            ),
            ("getHealth", CacheStrategy::new(300_000, Medium).prefetched()),
            ("getVersion", CacheStrategy::new(1_800_000, Low)),
            ("getEpochInfo", CacheStrategy::new(300_000, Medium).prefetched()),
            (
                "getBalance",
                CacheStrategy::new(60_000, Medium).with_max_age(600_000),
            ),
            (
                "getAccountInfo",
                CacheStrategy::new(60_000, Medium).with_max_age(600_000),
            ),
            ("getTokenAccountsByOwner", CacheStrategy::new(300_000, Medium)),
            // Confirmed transactions are immutable
            ("getTransaction", CacheStrategy::new(3_600_000, Low)),
            ("getSignatureStatuses", CacheStrategy::new(300_000, Medium)),
            (
                "getConfirmedSignaturesForAddress2",
                CacheStrategy::new(600_000, Medium),
            ),
            ("simulateTransaction", CacheStrategy::new(10_000, High)),
            (
                "sendTransaction",
                CacheStrategy {
                    enabled: false,
                    ..CacheStrategy::new(0, High)
                },
            ),
            ("getProgramAccounts", CacheStrategy::new(300_000, Medium)),
            ("getRecentPerformanceSamples", CacheStrategy::new(600_000, Low)),
            (DEFAULT_STRATEGY, CacheStrategy::new(60_000, Medium)),
        ];

        Self {
            providers,
            caching_strategies: strategies
                .into_iter()
                .map(|(method, strategy)| (method.to_string(), strategy))
                .collect(),
            prefetch: PrefetchSettings::default(),
        }
    }
}

impl RateLimitConfig {
    /// Defaults with the environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        let overrides = [
            ("syndica", "SYNDICA_RPS_LIMIT", "SYNDICA_MONTHLY_LIMIT"),
            ("helius", "HELIUS_RPS_LIMIT", "HELIUS_MONTHLY_LIMIT"),
        ];

        for (provider, rps_var, monthly_var) in overrides {
            if let Some(config) = self.providers.get_mut(provider) {
                if let Some(rps) = env_parse::<u32>(rps_var) {
                    config.rps_limit = rps;
                }
                if let Some(monthly) = env_parse::<u64>(monthly_var) {
                    config.monthly_limit = monthly;
                }
            }
        }

        if env::var("APP_ENV").map(|v| v == "development").unwrap_or(false) {
            self.prefetch.enabled = false;
        }
        if let Some(enabled) = env_parse::<bool>("PREFETCH_ENABLED") {
            self.prefetch.enabled = enabled;
        }
        if let Ok(program_id) = env::var("GAME_PROGRAM_ID") {
            self.prefetch.game_program_id = program_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, provider) in &self.providers {
            if !provider.enabled {
                continue;
            }
            if provider.rps_limit == 0 {
                return Err(ConfigError::ZeroRpsLimit(id.clone()));
            }
            if provider.monthly_limit == 0 {
                return Err(ConfigError::ZeroMonthlyLimit(id.clone()));
            }
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    /// Strategy for `method`, falling back to the `default` entry.
    pub fn strategy(&self, method: &str) -> CacheStrategy {
        self.caching_strategies
            .get(method)
            .or_else(|| self.caching_strategies.get(DEFAULT_STRATEGY))
            .cloned()
            .unwrap_or_else(|| CacheStrategy::new(60_000, Priority::Medium))
    }

    pub fn update_provider(&mut self, id: &str, update: ProviderUpdate) -> Result<(), ConfigError> {
        let mut patched = self
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProvider(id.to_string()))?;

        if let Some(rps) = update.rps_limit {
            patched.rps_limit = rps;
        }
        if let Some(monthly) = update.monthly_limit {
            patched.monthly_limit = monthly;
        }
        if let Some(enabled) = update.enabled {
            patched.enabled = enabled;
        }
        if update.fallback_provider.is_some() {
            patched.fallback_provider = update.fallback_provider;
        }

        if patched.enabled && patched.rps_limit == 0 {
            return Err(ConfigError::ZeroRpsLimit(id.to_string()));
        }
        if patched.enabled && patched.monthly_limit == 0 {
            return Err(ConfigError::ZeroMonthlyLimit(id.to_string()));
        }

        self.providers.insert(id.to_string(), patched);
        Ok(())
    }

    pub fn update_strategy(&mut self, method: &str, update: StrategyUpdate) -> Result<(), ConfigError> {
        let strategy = self
            .caching_strategies
            .get_mut(method)
            .ok_or_else(|| ConfigError::UnknownStrategy(method.to_string()))?;

        if let Some(ttl_ms) = update.ttl_ms {
            strategy.ttl_ms = ttl_ms;
        }
        if update.max_age_ms.is_some() {
            strategy.max_age_ms = update.max_age_ms;
        }
        if let Some(priority) = update.priority {
            strategy.priority = priority;
        }
        if let Some(enabled) = update.enabled {
            strategy.enabled = enabled;
        }
        Ok(())
    }

    pub fn into_shared(self) -> SharedRateLimitConfig {
        Arc::new(RwLock::new(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Devnet,
}

/// One logical upstream the client may select with `X-RPC-Endpoint`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    /// Key into `RateLimitConfig::providers`.
    pub provider: String,
    pub smart_cache: bool,
    pub priority: u8,
    pub network: Network,
}

impl EndpointConfig {
    fn new(name: &str, url: &str, provider: &str, priority: u8, network: Network) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            provider: provider.to_string(),
            smart_cache: matches!(provider, "syndica" | "helius"),
            priority,
            network,
        }
    }
}

fn default_endpoints(syndica_url: &str, helius_url: &str, devnet_url: &str) -> Vec<EndpointConfig> {
    use Network::*;
    vec![
        EndpointConfig::new("syndica-primary", syndica_url, "syndica", 1, Mainnet),
        EndpointConfig::new("syndica-balance", syndica_url, "syndica", 2, Mainnet),
        EndpointConfig::new("helius-backup", helius_url, "helius", 3, Mainnet),
        EndpointConfig::new("ankr-last-resort", "https://rpc.ankr.com/solana", "ankr", 4, Mainnet),
        EndpointConfig::new(
            "solana-labs-last-resort",
            "https://api.mainnet-beta.solana.com",
            "solana",
            5,
            Mainnet,
        ),
        EndpointConfig::new("devnet-primary", devnet_url, "solana", 1, Devnet),
        EndpointConfig::new("devnet-backup", "https://api.devnet.solana.com", "solana", 2, Devnet),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// In-process timers
    Tokio,
    /// Jobs only run when `/admin/tick` is called by an external cron
    Manual,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub allowed_origins: Vec<String>,
    pub endpoints: Vec<EndpointConfig>,
    pub primary_endpoint: String,
    pub upstream_timeout: Duration,
    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub cache_default_ttl: Duration,
    pub cache_cleanup_interval: Duration,
    pub queue_capacity: usize,
    pub scheduler_mode: SchedulerMode,
    pub rate_limits: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            allowed_origins: vec![
                "https://degenheart.casino".to_string(),
                "http://localhost:4001".to_string(),
            ],
            endpoints: default_endpoints(
                "https://solana-mainnet.api.syndica.io",
                "https://mainnet.helius-rpc.com",
                "https://api.devnet.solana.com",
            ),
            primary_endpoint: "syndica-primary".to_string(),
            upstream_timeout: Duration::from_secs(5),
            cache_enabled: true,
            cache_max_size: 1000,
            cache_default_ttl: Duration::from_secs(300),
            cache_cleanup_interval: Duration::from_secs(300),
            queue_capacity: 1000,
            scheduler_mode: SchedulerMode::Tokio,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::default();

        let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);
        let server_port = env_parse("SERVER_PORT").unwrap_or(defaults.server_port);
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        let syndica_url = env::var("SYNDICA_RPC_URL")
            .unwrap_or_else(|_| "https://solana-mainnet.api.syndica.io".to_string());
        let helius_url = env::var("HELIUS_RPC_URL")
            .unwrap_or_else(|_| "https://mainnet.helius-rpc.com".to_string());
        let devnet_url = env::var("DEVNET_RPC_URL")
            .unwrap_or_else(|_| "https://api.devnet.solana.com".to_string());

        let primary_endpoint = env::var("PRIMARY_ENDPOINT").unwrap_or(defaults.primary_endpoint);
        let upstream_timeout = env_parse("UPSTREAM_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.upstream_timeout);
        let cache_enabled = env_parse("ENABLE_CACHE_SYSTEM").unwrap_or(defaults.cache_enabled);
        let cache_max_size = env_parse("CACHE_MAX_SIZE").unwrap_or(defaults.cache_max_size);
        let cache_default_ttl = env_parse("CACHE_DEFAULT_TTL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.cache_default_ttl);
        let cache_cleanup_interval = env_parse("CACHE_CLEANUP_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_cleanup_interval);
        let queue_capacity = env_parse("RATE_LIMIT_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity);
        let scheduler_mode = match env::var("SCHEDULER_MODE").as_deref() {
            Ok("cron") | Ok("manual") => SchedulerMode::Manual,
            _ => SchedulerMode::Tokio,
        };

        Self {
            server_host,
            server_port,
            allowed_origins,
            endpoints: default_endpoints(&syndica_url, &helius_url, &devnet_url),
            primary_endpoint,
            upstream_timeout,
            cache_enabled,
            cache_max_size,
            cache_default_ttl,
            cache_cleanup_interval,
            queue_capacity,
            scheduler_mode,
            rate_limits: RateLimitConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint(&self.primary_endpoint).is_none() {
            return Err(ConfigError::UnknownPrimaryEndpoint(self.primary_endpoint.clone()));
        }
        self.rate_limits.validate()
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|endpoint| endpoint.name == name)
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.iter().map(|endpoint| endpoint.name.clone()).collect()
    }

    /// URL used when the smart cache calls `provider` directly: the
    /// highest-priority mainnet endpoint backed by that provider.
    pub fn provider_url(&self, provider: &str) -> Option<&str> {
        self.endpoints
            .iter()
            .filter(|endpoint| endpoint.provider == provider && endpoint.network == Network::Mainnet)
            .min_by_key(|endpoint| endpoint.priority)
            .map(|endpoint| endpoint.url.as_str())
    }

    /// Provider that receives background prefetch traffic.
    pub fn primary_provider(&self) -> &str {
        self.endpoint(&self.primary_endpoint)
            .map(|endpoint| endpoint.provider.as_str())
            .unwrap_or("syndica")
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_uses_default_strategy() {
        let config = RateLimitConfig::default();
        let strategy = config.strategy("getFeeForMessage");
        assert_eq!(strategy, config.caching_strategies[DEFAULT_STRATEGY]);
        assert_eq!(strategy.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn send_transaction_is_never_cached() {
        let config = RateLimitConfig::default();
        assert!(!config.strategy("sendTransaction").enabled);
    }

    #[test]
    fn zero_limits_are_rejected_for_enabled_providers() {
        let mut config = RateLimitConfig::default();
        assert_eq!(config.validate(), Ok(()));

        let err = config
            .update_provider("helius", ProviderUpdate { rps_limit: Some(0), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroRpsLimit("helius".to_string()));
        assert_eq!(config.providers["helius"].rps_limit, 10, "rejected update must not apply");

        config
            .update_provider("helius", ProviderUpdate { enabled: Some(false), ..Default::default() })
            .unwrap();
        config.providers.get_mut("helius").unwrap().rps_limit = 0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn strategy_update_patches_only_given_fields() {
        let mut config = RateLimitConfig::default();
        config
            .update_strategy("getSlot", StrategyUpdate { ttl_ms: Some(5_000), ..Default::default() })
            .unwrap();

        let strategy = config.strategy("getSlot");
        assert_eq!(strategy.ttl_ms, 5_000);
        assert_eq!(strategy.priority, Priority::High);
        assert!(strategy.enabled);

        assert!(matches!(
            config.update_strategy("noSuchMethod", StrategyUpdate::default()),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn provider_url_prefers_lowest_priority_mainnet_endpoint() {
        let config = Config::default();
        assert_eq!(config.provider_url("syndica"), Some("https://solana-mainnet.api.syndica.io"));
        assert_eq!(config.provider_url("solana"), Some("https://api.mainnet-beta.solana.com"));
        assert_eq!(config.provider_url("nope"), None);
        assert_eq!(config.primary_provider(), "syndica");
    }

    #[test]
    fn only_syndica_and_helius_endpoints_use_the_smart_cache() {
        let config = Config::default();
        let smart: Vec<_> = config
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.smart_cache)
            .map(|endpoint| endpoint.name.as_str())
            .collect();
        assert_eq!(smart, vec!["syndica-primary", "syndica-balance", "helius-backup"]);
    }
}
