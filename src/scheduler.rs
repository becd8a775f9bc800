//! Recurring background work (cache sweeps, limiter maintenance, prefetch
//! ticks) behind a `Scheduler` trait.
//!
//! `TokioScheduler` drives jobs from in-process timers. `ManualScheduler`
//! never fires on its own: an external cron calls `run_all`, which suits hosts
//! that cannot keep long-lived timers between requests.

use futures::future::{self, BoxFuture};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Build a `Job` from an async closure.
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Cancels one scheduled job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    token: CancellationToken,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `job` every `period`. The first run happens one period from now.
    fn every(&self, name: &str, period: Duration, job: Job) -> JobHandle;

    /// Run every live job once, right now. Returns how many ran.
    fn run_all(&self) -> BoxFuture<'static, usize>;

    /// Cancel every job registered so far.
    fn shutdown(&self);
}

struct Registered {
    name: String,
    job: Job,
    token: CancellationToken,
}

#[derive(Default)]
struct JobRegistry {
    jobs: Mutex<Vec<Registered>>,
}

impl JobRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<Registered>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, name: &str, job: Job, token: CancellationToken) {
        let mut jobs = self.lock();
        jobs.retain(|registered| !registered.token.is_cancelled());
        jobs.push(Registered {
            name: name.to_string(),
            job,
            token,
        });
    }

    fn live_jobs(&self) -> Vec<(String, Job)> {
        let mut jobs = self.lock();
        jobs.retain(|registered| !registered.token.is_cancelled());
        jobs.iter()
            .map(|registered| (registered.name.clone(), registered.job.clone()))
            .collect()
    }

    fn cancel_all(&self) {
        for registered in self.lock().drain(..) {
            registered.token.cancel();
        }
    }

    fn run_all(&self) -> BoxFuture<'static, usize> {
        let jobs = self.live_jobs();
        Box::pin(async move {
            let count = jobs.len();
            future::join_all(jobs.into_iter().map(|(name, job)| async move {
                debug!("Running job {}", name);
                job().await;
            }))
            .await;
            count
        })
    }
}

/// Timer-backed scheduler; one tokio task per job.
pub struct TokioScheduler {
    root: CancellationToken,
    registry: JobRegistry,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            registry: JobRegistry::default(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, name: &str, period: Duration, job: Job) -> JobHandle {
        let token = self.root.child_token();
        self.registry.register(name, job.clone(), token.clone());

        let task_token = token.clone();
        let task_name = name.to_string();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => job().await,
                    _ = task_token.cancelled() => {
                        debug!("Job {} stopped", task_name);
                        break;
                    }
                }
            }
        });

        debug!("Scheduled job {} every {:?}", name, period);
        JobHandle { token }
    }

    fn run_all(&self) -> BoxFuture<'static, usize> {
        self.registry.run_all()
    }

    fn shutdown(&self) {
        info!("Shutting down scheduler");
        self.root.cancel();
        self.registry.cancel_all();
    }
}

/// Scheduler whose jobs only run when `run_all` is called.
#[derive(Default)]
pub struct ManualScheduler {
    registry: JobRegistry,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, name: &str, period: Duration, job: Job) -> JobHandle {
        let token = CancellationToken::new();
        self.registry.register(name, job, token.clone());
        debug!("Registered job {} (nominal period {:?})", name, period);
        JobHandle { token }
    }

    fn run_all(&self) -> BoxFuture<'static, usize> {
        self.registry.run_all()
    }

    fn shutdown(&self) {
        self.registry.cancel_all();
    }
}
