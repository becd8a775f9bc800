//! Background refresh targets.
//!
//! Every active target owns one scheduled job. Targets are deduplicated by
//! `method:JSON(params)` and indexed by the owner that added them, so removing
//! a wallet cancels exactly the targets that wallet registered.

use super::{CallOptions, SmartCache};
use crate::config::PrefetchSettings;
use crate::scheduler::{job, JobHandle};
use crate::validation::{validate_game_id, validate_solana_address, game_id_from_route, ValidationError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

const PREFETCH_ENDPOINT: &str = "prefetch";
const MAX_RECENT_GAMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchTarget {
    pub method: String,
    pub params: Value,
    pub frequency_secs: u64,
    pub enabled: bool,
}

impl PrefetchTarget {
    fn new(method: &str, params: Value, frequency_secs: u64, enabled: bool) -> Self {
        Self {
            method: method.to_string(),
            params,
            frequency_secs,
            enabled,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.method, self.params)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.frequency_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetOwner {
    Baseline,
    Wallet(String),
    Game(String),
}

struct ActiveTarget {
    target: PrefetchTarget,
    owner: TargetOwner,
    handle: JobHandle,
}

#[derive(Default)]
pub(crate) struct PrefetchRegistry {
    active: BTreeMap<String, ActiveTarget>,
}

impl PrefetchRegistry {
    fn remove_owned_by(&mut self, owner: &TargetOwner) -> usize {
        let before = self.active.len();
        self.active.retain(|_, active| {
            if &active.owner == owner {
                active.handle.cancel();
                false
            } else {
                true
            }
        });
        before - self.active.len()
    }
}

/// Static set refreshed for the whole process.
pub fn baseline_targets(settings: &PrefetchSettings) -> Vec<PrefetchTarget> {
    let chain = settings.enabled;
    let game = settings.enabled && settings.game_transaction_prefetch;
    let program = json!([settings.game_program_id]);

    vec![
        PrefetchTarget::new("getLatestBlockhash", json!([]), 15, chain),
        PrefetchTarget::new("getSlot", json!([]), 30, chain),
        PrefetchTarget::new("getBlockHeight", json!([]), 30, chain),
        PrefetchTarget::new("getHealth", json!([]), 120, chain),
        PrefetchTarget::new("getEpochInfo", json!([]), 300, chain),
        PrefetchTarget::new("getAccountInfo", program.clone(), 60, game),
        PrefetchTarget::new("getProgramAccounts", program, 120, game),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    High,
    #[default]
    Medium,
    Low,
}

/// What a client session looks like right now.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrefetchContext {
    pub user_wallet: Option<String>,
    pub current_route: Option<String>,
    /// Most recent first.
    pub recent_games: Vec<String>,
    /// On-chain account for each game id the client knows about.
    pub game_addresses: HashMap<String, String>,
    pub activity: Activity,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchReport {
    pub user_targets: usize,
    pub game_targets: usize,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub targets: usize,
    pub succeeded: usize,
}

impl SmartCache {
    /// Register the baseline targets. Safe to call again; active keys are skipped.
    pub async fn start_prefetching(&self) -> usize {
        let settings = self.inner.config.read().await.prefetch.clone();
        if !settings.enabled {
            info!("Prefetching disabled");
            return 0;
        }

        let mut started = 0;
        for target in baseline_targets(&settings) {
            if target.enabled && self.activate(target, TargetOwner::Baseline).await {
                started += 1;
            }
        }

        info!("Started {} prefetch targets on {}", started, self.primary_provider());
        started
    }

    /// Schedule `target` and run it once immediately. False if its key is already active.
    async fn activate(&self, target: PrefetchTarget, owner: TargetOwner) -> bool {
        let key = target.key();
        let mut registry = self.inner.registry.lock().await;
        if registry.active.contains_key(&key) {
            debug!("Prefetch target {} already active", key);
            return false;
        }

        let tick_cache = self.clone();
        let tick_target = target.clone();
        let handle = self.inner.scheduler.every(
            &format!("prefetch:{}", key),
            target.period(),
            job(move || {
                let cache = tick_cache.clone();
                let target = tick_target.clone();
                async move {
                    cache.prefetch(&target).await;
                }
            }),
        );

        registry.active.insert(
            key,
            ActiveTarget {
                target: target.clone(),
                owner,
                handle,
            },
        );
        drop(registry);

        let cache = self.clone();
        tokio::spawn(async move {
            cache.prefetch(&target).await;
        });
        true
    }

    /// Refresh one target through the primary provider. Failures are logged only.
    async fn prefetch(&self, target: &PrefetchTarget) -> bool {
        let options = CallOptions {
            force_fresh: true,
            endpoint: Some(PREFETCH_ENDPOINT.to_string()),
            ..CallOptions::default()
        };

        match self
            .smart_rpc_call(self.primary_provider(), &target.method, &target.params, options)
            .await
        {
            Ok(_) => {
                debug!("Prefetched {}", target.key());
                true
            }
            Err(err) => {
                warn!("Prefetch failed for {}: {}", target.key(), err);
                false
            }
        }
    }

    pub async fn add_user_targets(&self, wallet: &str) -> Result<usize, ValidationError> {
        validate_solana_address(wallet)?;

        if !self.inner.config.read().await.prefetch.user_pattern_prefetch {
            return Ok(0);
        }

        let owner = TargetOwner::Wallet(wallet.to_string());
        let mut added = 0;
        for target in [
            PrefetchTarget::new("getBalance", json!([wallet]), 45, true),
            PrefetchTarget::new("getAccountInfo", json!([wallet]), 90, true),
        ] {
            if self.activate(target, owner.clone()).await {
                added += 1;
            }
        }

        info!("Added {} prefetch targets for wallet {}", added, wallet);
        Ok(added)
    }

    pub async fn remove_user_targets(&self, wallet: &str) -> usize {
        let removed = self
            .inner
            .registry
            .lock()
            .await
            .remove_owned_by(&TargetOwner::Wallet(wallet.to_string()));
        info!("Removed {} prefetch targets for wallet {}", removed, wallet);
        removed
    }

    /// Watch a game's account. Without a known address there is nothing to fetch.
    pub async fn add_game_target(&self, game_id: &str, game_address: Option<&str>) -> Result<bool, ValidationError> {
        validate_game_id(game_id)?;

        if !self.inner.config.read().await.prefetch.game_transaction_prefetch {
            return Ok(false);
        }

        let Some(address) = game_address else {
            debug!("No account address for game {}, skipping prefetch", game_id);
            return Ok(false);
        };
        validate_solana_address(address)?;

        let target = PrefetchTarget::new("getAccountInfo", json!([address]), 30, true);
        let added = self.activate(target, TargetOwner::Game(game_id.to_string())).await;
        if added {
            info!("Added prefetch target for game {}", game_id);
        }
        Ok(added)
    }

    pub async fn intelligent_prefetch(&self, context: PrefetchContext) -> Result<PrefetchReport, ValidationError> {
        let mut report = PrefetchReport::default();
        if !self.inner.config.read().await.prefetch.intelligent_prefetch {
            return Ok(report);
        }

        if let Some(wallet) = context.user_wallet.as_deref() {
            report.user_targets = self.add_user_targets(wallet).await?;
        }

        let current_game = context.current_route.as_deref().and_then(game_id_from_route);
        let mut games: Vec<&str> = current_game.into_iter().collect();
        if context.activity == Activity::High {
            games.extend(context.recent_games.iter().take(MAX_RECENT_GAMES).map(String::as_str));
        }

        for game_id in games {
            let address = context.game_addresses.get(game_id).map(String::as_str);
            if self.add_game_target(game_id, address).await? {
                report.game_targets += 1;
            }
        }

        info!(
            "Intelligent prefetch for {:?} activity: {} user targets, {} game targets",
            context.activity, report.user_targets, report.game_targets
        );
        Ok(report)
    }

    /// One immediate refresh of every active target.
    pub async fn warm(&self) -> WarmReport {
        let targets: Vec<PrefetchTarget> = self
            .inner
            .registry
            .lock()
            .await
            .active
            .values()
            .map(|active| active.target.clone())
            .collect();

        let results = join_all(targets.iter().map(|target| self.prefetch(target))).await;
        let report = WarmReport {
            targets: targets.len(),
            succeeded: results.into_iter().filter(|ok| *ok).count(),
        };
        info!("Warmed {}/{} prefetch targets", report.succeeded, report.targets);
        report
    }

    pub async fn active_target_keys(&self) -> Vec<String> {
        self.inner.registry.lock().await.active.keys().cloned().collect()
    }

    pub async fn stop_prefetching(&self) {
        let mut registry = self.inner.registry.lock().await;
        for active in registry.active.values() {
            active.handle.cancel();
        }
        registry.active.clear();
        info!("Stopped all prefetching");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_respects_switches() {
        let settings = PrefetchSettings::default();
        let targets = baseline_targets(&settings);
        assert_eq!(targets.len(), 7);
        assert!(targets.iter().all(|target| target.enabled));
        assert_eq!(targets[0].key(), "getLatestBlockhash:[]");

        let no_games = PrefetchSettings {
            game_transaction_prefetch: false,
            ..PrefetchSettings::default()
        };
        let enabled: Vec<_> = baseline_targets(&no_games)
            .into_iter()
            .filter(|target| target.enabled)
            .map(|target| target.method)
            .collect();
        assert_eq!(
            enabled,
            vec!["getLatestBlockhash", "getSlot", "getBlockHeight", "getHealth", "getEpochInfo"]
        );
    }

    #[test]
    fn key_is_method_and_serialized_params() {
        let target = PrefetchTarget::new("getBalance", json!(["abc"]), 45, true);
        assert_eq!(target.key(), r#"getBalance:["abc"]"#);
        assert_eq!(target.period(), Duration::from_secs(45));
    }

    #[test]
    fn context_deserializes_with_defaults() {
        let context: PrefetchContext = serde_json::from_value(json!({
            "currentRoute": "/game/dice",
            "activity": "high"
        }))
        .unwrap();
        assert_eq!(context.activity, Activity::High);
        assert!(context.user_wallet.is_none());
        assert!(context.recent_games.is_empty());
    }
}
