use crate::config::ProviderConfig;
use serde::Serialize;

const CRITICAL_UTILIZATION: f64 = 80.0;
const WARNING_UTILIZATION: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Classify by the worse of the two utilizations (percentages).
    pub fn from_utilization(rps_percent: f64, monthly_percent: f64) -> Self {
        let worst = rps_percent.max(monthly_percent);
        if worst > CRITICAL_UTILIZATION {
            HealthStatus::Critical
        } else if worst > WARNING_UTILIZATION {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Observability snapshot for one provider. Never used for admission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub current_rps: f64,
    pub monthly_usage: u64,
    pub limits: ProviderConfig,
    pub status: HealthStatus,
}

impl ProviderStatus {
    pub fn new(current_rps: f64, monthly_usage: u64, limits: ProviderConfig) -> Self {
        let rps_percent = percent(current_rps, limits.rps_limit as f64);
        let monthly_percent = percent(monthly_usage as f64, limits.monthly_limit as f64);
        Self {
            current_rps,
            monthly_usage,
            status: HealthStatus::from_utilization(rps_percent, monthly_percent),
            limits,
        }
    }
}

fn percent(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        used / limit * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_exclusive() {
        assert_eq!(HealthStatus::from_utilization(60.0, 0.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_utilization(60.1, 0.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_utilization(0.0, 80.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_utilization(10.0, 80.5), HealthStatus::Critical);
    }
}
