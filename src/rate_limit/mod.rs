pub mod limiter;
pub mod queue;
pub mod status;

pub use limiter::{next_month_reset, RateLimitDecision, RateLimiter, RequestRecord};
pub use status::{HealthStatus, ProviderStatus};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Unknown or disabled provider: {0}")]
    UnknownOrDisabledProvider(String),

    #[error("Rate limited by {provider}")]
    Limited {
        provider: String,
        decision: Box<RateLimitDecision>,
    },

    #[error("Request queue for {provider} is full")]
    QueueFull {
        provider: String,
        decision: Box<RateLimitDecision>,
    },

    #[error("Request queue closed before the call ran")]
    QueueClosed,
}

impl RateLimitError {
    /// The denial that produced this error, if any.
    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            Self::Limited { decision, .. } | Self::QueueFull { decision, .. } => Some(decision),
            _ => None,
        }
    }
}
