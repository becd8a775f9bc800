//! Sliding-window admission control per provider.
//!
//! Every admitted call appends a `RequestRecord` to the history of its
//! `(provider, endpoint)` key. The per-second cap is strict: a call is denied
//! whenever the provider already has `rps_limit` calls in the trailing second,
//! summed over all of its endpoint keys. No burst credit accumulates.

use super::queue::{EnqueueError, QueuedCall, RequestQueues};
use super::status::ProviderStatus;
use super::RateLimitError;
use crate::config::{ProviderConfig, SharedRateLimitConfig};
use crate::scheduler::{job, JobHandle, Scheduler};
use chrono::{DateTime, Datelike, Local, TimeZone};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const RPS_WINDOW: Duration = Duration::from_secs(1);
const SMOOTHING_WINDOW: Duration = Duration::from_secs(60);
const RETENTION: Duration = Duration::from_secs(5 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const MONTHLY_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub current_rps: f64,
    pub monthly_usage: u64,
    pub rps_remaining: f64,
    pub monthly_remaining: u64,
    /// Local midnight on the first day of next month, in epoch millis.
    pub monthly_reset_at_millis: i64,
}

struct MonthlyCounter {
    count: u64,
    last_reset: DateTime<Local>,
}

impl MonthlyCounter {
    fn new(now: DateTime<Local>) -> Self {
        Self { count: 0, last_reset: now }
    }

    /// Zero the counter when `now` falls in a later calendar month.
    fn roll_over(&mut self, now: DateTime<Local>) -> bool {
        let current = (now.year(), now.month());
        let last = (self.last_reset.year(), self.last_reset.month());
        if current > last {
            self.count = 0;
            self.last_reset = now;
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub(crate) struct LimiterState {
    /// provider -> endpoint -> admitted calls, oldest first
    requests: HashMap<String, HashMap<String, VecDeque<RequestRecord>>>,
    monthly: HashMap<String, MonthlyCounter>,
}

impl LimiterState {
    pub(crate) fn record(&mut self, provider: &str, endpoint: &str, now: Instant, wall: DateTime<Local>) {
        self.requests
            .entry(provider.to_string())
            .or_default()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(RequestRecord { at: now });

        let counter = self
            .monthly
            .entry(provider.to_string())
            .or_insert_with(|| MonthlyCounter::new(wall));
        counter.roll_over(wall);
        counter.count += 1;
    }

    /// Calls for `provider` younger than `window`, and the oldest of them.
    fn window(&self, provider: &str, now: Instant, window: Duration) -> (usize, Option<Instant>) {
        let Some(endpoints) = self.requests.get(provider) else {
            return (0, None);
        };

        let mut count = 0;
        let mut oldest: Option<Instant> = None;
        for history in endpoints.values() {
            for record in history.iter().rev() {
                if now.duration_since(record.at) >= window {
                    break;
                }
                count += 1;
                oldest = Some(oldest.map_or(record.at, |at| at.min(record.at)));
            }
        }
        (count, oldest)
    }

    fn monthly_usage(&self, provider: &str) -> u64 {
        self.monthly.get(provider).map_or(0, |counter| counter.count)
    }
}

/// Per-provider admission control with a monthly quota and a deferred queue.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    config: SharedRateLimitConfig,
    state: Arc<Mutex<LimiterState>>,
    queues: Arc<RequestQueues>,
    jobs: Arc<StdMutex<Vec<JobHandle>>>,
}

impl RateLimiter {
    pub fn new(config: SharedRateLimitConfig, queue_capacity: usize) -> Self {
        let state = Arc::new(Mutex::new(LimiterState::default()));
        Self {
            queues: Arc::new(RequestQueues::new(queue_capacity, state.clone())),
            config,
            state,
            jobs: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    async fn enabled_provider(&self, provider: &str) -> Result<ProviderConfig, RateLimitError> {
        self.config
            .read()
            .await
            .provider(provider)
            .filter(|config| config.enabled)
            .cloned()
            .ok_or_else(|| RateLimitError::UnknownOrDisabledProvider(provider.to_string()))
    }

    /// Decide whether one call to `provider` may go out now, and record it if so.
    ///
    /// Fails only for unknown or disabled providers; a denial is an `Ok`
    /// decision with `allowed == false`.
    pub async fn check_limit(&self, provider: &str, endpoint: &str) -> Result<RateLimitDecision, RateLimitError> {
        let config = self.enabled_provider(provider).await?;
        let now = Instant::now();
        let wall = Local::now();
        let reset_at = next_month_reset(&wall).timestamp_millis();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let counter = state
            .monthly
            .entry(provider.to_string())
            .or_insert_with(|| MonthlyCounter::new(wall));
        counter.roll_over(wall);
        let monthly_usage = counter.count;

        if monthly_usage >= config.monthly_limit {
            warn!("{} monthly quota exhausted ({} calls)", provider, monthly_usage);
            return Ok(RateLimitDecision {
                allowed: false,
                retry_after_secs: None,
                queue_position: None,
                current_rps: 0.0,
                monthly_usage,
                rps_remaining: 0.0,
                monthly_remaining: 0,
                monthly_reset_at_millis: reset_at,
            });
        }

        let (last_minute, _) = state.window(provider, now, SMOOTHING_WINDOW);
        let current_rps = last_minute as f64 / SMOOTHING_WINDOW.as_secs_f64();
        let rps_limit = config.rps_limit as f64;

        let (last_second, oldest) = state.window(provider, now, RPS_WINDOW);
        if last_second >= config.rps_limit as usize {
            let waited = oldest.map_or(Duration::ZERO, |at| now.duration_since(at));
            let retry_after = (1.0 - waited.as_secs_f64()).ceil().max(1.0) as u64;
            debug!(
                "Denied {}:{} ({} calls in the last second, retry in {}s)",
                provider, endpoint, last_second, retry_after
            );
            return Ok(RateLimitDecision {
                allowed: false,
                retry_after_secs: Some(retry_after),
                queue_position: None,
                current_rps,
                monthly_usage,
                rps_remaining: (rps_limit - current_rps).max(0.0),
                monthly_remaining: config.monthly_limit - monthly_usage,
                monthly_reset_at_millis: reset_at,
            });
        }

        state.record(provider, endpoint, now, wall);

        Ok(RateLimitDecision {
            allowed: true,
            retry_after_secs: None,
            queue_position: None,
            current_rps,
            monthly_usage: monthly_usage + 1,
            rps_remaining: (rps_limit - current_rps - 1.0).max(0.0),
            monthly_remaining: config.monthly_limit - monthly_usage - 1,
            monthly_reset_at_millis: reset_at,
        })
    }

    /// Run `call` now if admitted, otherwise once after `retry_after` from the
    /// provider's FIFO queue.
    ///
    /// The delayed call is not re-checked against the window; it is recorded
    /// when it fires. Monthly-quota denials and a full queue fail with
    /// `RateLimitError` instead of queueing.
    pub async fn queue_request<T, E, F, Fut>(&self, provider: &str, endpoint: &str, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<RateLimitError> + Send + 'static,
    {
        let mut decision = self.check_limit(provider, endpoint).await?;
        if decision.allowed {
            return call().await;
        }

        let Some(retry_after) = decision.retry_after_secs else {
            return Err(RateLimitError::Limited {
                provider: provider.to_string(),
                decision: Box::new(decision),
            }
            .into());
        };

        let (tx, rx) = oneshot::channel();
        let queued = QueuedCall {
            deadline: Instant::now() + Duration::from_secs(retry_after),
            endpoint: endpoint.to_string(),
            run: Box::pin(async move {
                // The caller may have gone away; nothing to do then.
                let _ = tx.send(call().await);
            }),
        };

        match self.queues.enqueue(provider, queued) {
            Ok(position) => {
                decision.queue_position = Some(position);
                info!(
                    "Queued call to {}:{} at position {}, retry in {}s",
                    provider, endpoint, position, retry_after
                );
            }
            Err(EnqueueError::Closed) => return Err(RateLimitError::QueueClosed.into()),
            Err(EnqueueError::Full) => {
                warn!("Request queue for {} is full", provider);
                return Err(RateLimitError::QueueFull {
                    provider: provider.to_string(),
                    decision: Box::new(decision),
                }
                .into());
            }
        }

        rx.await.unwrap_or_else(|_| Err(RateLimitError::QueueClosed.into()))
    }

    pub async fn status(&self, provider: &str) -> Result<ProviderStatus, RateLimitError> {
        let limits = self
            .config
            .read()
            .await
            .provider(provider)
            .cloned()
            .ok_or_else(|| RateLimitError::UnknownOrDisabledProvider(provider.to_string()))?;

        let state = self.state.lock().await;
        let (last_minute, _) = state.window(provider, Instant::now(), SMOOTHING_WINDOW);
        let current_rps = last_minute as f64 / SMOOTHING_WINDOW.as_secs_f64();

        Ok(ProviderStatus::new(current_rps, state.monthly_usage(provider), limits))
    }

    pub async fn status_all(&self) -> BTreeMap<String, ProviderStatus> {
        let providers: Vec<String> = self.config.read().await.providers.keys().cloned().collect();
        let mut report = BTreeMap::new();
        for provider in providers {
            if let Ok(status) = self.status(&provider).await {
                report.insert(provider, status);
            }
        }
        report
    }

    /// Drop history older than the retention horizon. Returns records removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut removed = 0;

        state.requests.retain(|_, endpoints| {
            endpoints.retain(|_, history| {
                while history
                    .front()
                    .is_some_and(|record| now.duration_since(record.at) >= RETENTION)
                {
                    history.pop_front();
                    removed += 1;
                }
                !history.is_empty()
            });
            !endpoints.is_empty()
        });

        removed
    }

    pub async fn reset_monthly_counters(&self) -> usize {
        self.reset_monthly_counters_at(Local::now()).await
    }

    /// Zero every counter whose last reset lies in an earlier month than `now`.
    pub async fn reset_monthly_counters_at(&self, now: DateTime<Local>) -> usize {
        let mut state = self.state.lock().await;
        let mut reset = 0;
        for (provider, counter) in state.monthly.iter_mut() {
            if counter.roll_over(now) {
                info!("Monthly counter reset for {}", provider);
                reset += 1;
            }
        }
        reset
    }

    pub async fn monthly_usage(&self, provider: &str) -> u64 {
        self.state.lock().await.monthly_usage(provider)
    }

    /// Register the history sweep and the monthly reset check.
    pub fn start_maintenance(&self, scheduler: &dyn Scheduler) {
        let cleanup_limiter = self.clone();
        let cleanup = scheduler.every(
            "rate-limit-cleanup",
            CLEANUP_INTERVAL,
            job(move || {
                let limiter = cleanup_limiter.clone();
                async move {
                    let removed = limiter.cleanup().await;
                    if removed > 0 {
                        debug!("Trimmed {} rate limit records", removed);
                    }
                }
            }),
        );

        let reset_limiter = self.clone();
        let monthly = scheduler.every(
            "rate-limit-monthly-reset",
            MONTHLY_CHECK_INTERVAL,
            job(move || {
                let limiter = reset_limiter.clone();
                async move {
                    limiter.reset_monthly_counters().await;
                }
            }),
        );

        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([cleanup, monthly]);
    }

    pub fn shutdown(&self) {
        for handle in self.jobs.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            handle.cancel();
        }
        self.queues.shutdown();
    }
}

/// Midnight on the first day of the month after `now`, in `now`'s zone.
pub fn next_month_reset<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let zone = now.timezone();
    zone.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .earliest()
        // Midnight can fall in a DST gap.
        .or_else(|| zone.with_ymd_and_hms(year, month, 1, 1, 0, 0).earliest())
        .unwrap_or_else(|| now.clone())
}
