//! Per-provider FIFO of calls deferred by the limiter.
//!
//! One worker per provider drains its queue in arrival order. Each call fires
//! at its own deadline (enqueue time plus `retry_after`), is recorded against
//! the window, then runs on its own task.

use super::limiter::LimiterState;
use chrono::Local;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(crate) struct QueuedCall {
    pub deadline: Instant,
    pub endpoint: String,
    pub run: BoxFuture<'static, ()>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum EnqueueError {
    Full,
    Closed,
}

pub(crate) struct RequestQueues {
    capacity: usize,
    state: Arc<Mutex<LimiterState>>,
    senders: StdMutex<HashMap<String, mpsc::Sender<QueuedCall>>>,
    shutdown: CancellationToken,
}

impl RequestQueues {
    pub(crate) fn new(capacity: usize, state: Arc<Mutex<LimiterState>>) -> Self {
        Self {
            capacity: capacity.max(1),
            state,
            senders: StdMutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<QueuedCall>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `call` to the provider's queue. Returns its 1-based position.
    pub(crate) fn enqueue(&self, provider: &str, call: QueuedCall) -> Result<usize, EnqueueError> {
        if self.shutdown.is_cancelled() {
            return Err(EnqueueError::Closed);
        }

        let sender = self
            .senders()
            .entry(provider.to_string())
            .or_insert_with(|| self.spawn_worker(provider))
            .clone();

        sender.try_send(call).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })?;

        Ok((sender.max_capacity() - sender.capacity()).max(1))
    }

    fn spawn_worker(&self, provider: &str) -> mpsc::Sender<QueuedCall> {
        let (tx, rx) = mpsc::channel(self.capacity);
        tokio::spawn(drain(
            provider.to_string(),
            rx,
            self.state.clone(),
            self.shutdown.clone(),
        ));
        debug!("Started request queue worker for {}", provider);
        tx
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
        self.senders().clear();
    }
}

async fn drain(
    provider: String,
    mut rx: mpsc::Receiver<QueuedCall>,
    state: Arc<Mutex<LimiterState>>,
    shutdown: CancellationToken,
) {
    loop {
        let call = tokio::select! {
            call = rx.recv() => match call {
                Some(call) => call,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        tokio::select! {
            _ = sleep_until(call.deadline) => {}
            _ = shutdown.cancelled() => break,
        }

        state
            .lock()
            .await
            .record(&provider, &call.endpoint, Instant::now(), Local::now());
        debug!("Running queued call for {}:{}", provider, call.endpoint);
        tokio::spawn(call.run);
    }

    info!("Request queue worker for {} stopped", provider);
}
