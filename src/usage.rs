//! Per-route usage accounting for the gateway's own HTTP surface.
//!
//! Every handled request leaves one `UsageRecord`. Records older than a day
//! are dropped as new ones arrive.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageCategory {
    Rpc,
    Prefetch,
    Admin,
    Monitoring,
}

impl UsageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Rpc => "rpc",
            UsageCategory::Prefetch => "prefetch",
            UsageCategory::Admin => "admin",
            UsageCategory::Monitoring => "monitoring",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub at: Instant,
    /// Upstream endpoint name for RPC calls, the route path otherwise.
    pub endpoint: String,
    pub category: UsageCategory,
    pub success: bool,
    pub response_time: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub total: u64,
    pub failed: u64,
    pub by_category: BTreeMap<UsageCategory, u64>,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMetrics {
    pub hourly: UsageTotals,
    pub daily: UsageTotals,
    /// Last-day RPC calls per upstream endpoint.
    pub rpc: BTreeMap<String, u64>,
}

#[derive(Default)]
pub struct UsageTracker {
    records: Mutex<VecDeque<UsageRecord>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track(&self, record: UsageRecord) {
        let mut records = self.records.lock().await;
        let now = record.at;
        while records
            .front()
            .is_some_and(|oldest| now.duration_since(oldest.at) >= DAY)
        {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub async fn hourly(&self) -> UsageTotals {
        self.totals(HOUR).await
    }

    pub async fn daily(&self) -> UsageTotals {
        self.totals(DAY).await
    }

    pub async fn rpc_endpoint_usage(&self) -> BTreeMap<String, u64> {
        let now = Instant::now();
        let records = self.records.lock().await;
        let mut by_endpoint = BTreeMap::new();
        for record in recent(&records, now, DAY).filter(|r| r.category == UsageCategory::Rpc) {
            *by_endpoint.entry(record.endpoint.clone()).or_insert(0) += 1;
        }
        by_endpoint
    }

    pub async fn metrics(&self) -> UsageMetrics {
        UsageMetrics {
            hourly: self.hourly().await,
            daily: self.daily().await,
            rpc: self.rpc_endpoint_usage().await,
        }
    }

    async fn totals(&self, window: Duration) -> UsageTotals {
        let now = Instant::now();
        let records = self.records.lock().await;

        let mut totals = UsageTotals::default();
        let mut elapsed = Duration::ZERO;
        for record in recent(&records, now, window) {
            totals.total += 1;
            if !record.success {
                totals.failed += 1;
            }
            *totals.by_category.entry(record.category).or_insert(0) += 1;
            elapsed += record.response_time;
        }
        if totals.total > 0 {
            totals.avg_response_ms = elapsed.as_secs_f64() * 1000.0 / totals.total as f64;
        }
        totals
    }
}

fn recent<'a>(
    records: &'a VecDeque<UsageRecord>,
    now: Instant,
    window: Duration,
) -> impl Iterator<Item = &'a UsageRecord> + 'a {
    records
        .iter()
        .rev()
        .take_while(move |record| now.duration_since(record.at) < window)
}
