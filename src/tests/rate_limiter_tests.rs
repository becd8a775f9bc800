//! Admission, quota and queue behaviour of the sliding-window limiter.

#[cfg(test)]
mod tests {
    use crate::{
        config::{ProviderUpdate, RateLimitConfig},
        rate_limit::{next_month_reset, HealthStatus, RateLimitError, RateLimiter},
    };
    use chrono::Local;
    use std::time::Duration;

    fn limiter_with(configure: impl FnOnce(&mut RateLimitConfig)) -> RateLimiter {
        let mut config = RateLimitConfig::default();
        configure(&mut config);
        RateLimiter::new(config.into_shared(), 8)
    }

    fn monthly_limit(provider: &str, limit: u64) -> impl FnOnce(&mut RateLimitConfig) + '_ {
        move |config| {
            config
                .update_provider(
                    provider,
                    ProviderUpdate {
                        monthly_limit: Some(limit),
                        ..Default::default()
                    },
                )
                .unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admits_exactly_rps_limit_per_second() {
        let limiter = limiter_with(|_| {});

        for i in 0..10 {
            let decision = limiter.check_limit("helius", "rpc").await.unwrap();
            assert!(decision.allowed, "call {} should be admitted", i);
        }

        let denied = limiter.check_limit("helius", "rpc").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(1));
        assert_eq!(denied.monthly_usage, 10);
        assert_eq!(limiter.monthly_usage("helius").await, 10, "denials are not recorded");
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_once_oldest_call_ages_out() {
        let limiter = limiter_with(|_| {});
        for _ in 0..10 {
            limiter.check_limit("helius", "rpc").await.unwrap();
        }

        tokio::time::advance(Duration::from_millis(600)).await;
        let denied = limiter.check_limit("helius", "rpc").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(1), "retry is floored at one second");

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(limiter.check_limit("helius", "rpc").await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_across_endpoint_keys_shares_the_provider_cap() {
        let limiter = limiter_with(|_| {});

        let mut admitted = 0;
        for round in 0..3 {
            for i in 0..5 {
                let endpoint = format!("burst-test-{}", i);
                if limiter.check_limit("helius", &endpoint).await.unwrap().allowed {
                    admitted += 1;
                }
            }
            assert!(admitted <= 10, "round {} exceeded the cap", round);
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn unknown_or_disabled_provider_is_an_error() {
        let limiter = limiter_with(|config| {
            config
                .update_provider(
                    "ankr",
                    ProviderUpdate {
                        enabled: Some(false),
                        ..Default::default()
                    },
                )
                .unwrap()
        });

        for provider in ["nope", "ankr"] {
            let err = limiter.check_limit(provider, "rpc").await.unwrap_err();
            assert!(matches!(err, RateLimitError::UnknownOrDisabledProvider(ref p) if p == provider));
        }
    }

    #[tokio::test]
    async fn monthly_quota_denies_without_retry_hint() {
        let limiter = limiter_with(monthly_limit("helius", 3));

        for _ in 0..3 {
            assert!(limiter.check_limit("helius", "rpc").await.unwrap().allowed);
        }

        let denied = limiter.check_limit("helius", "rpc").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, None);
        assert_eq!(denied.monthly_usage, 3);
        assert_eq!(denied.monthly_remaining, 0);
        assert_eq!(denied.rps_remaining, 0.0);
        assert_eq!(
            denied.monthly_reset_at_millis,
            next_month_reset(&Local::now()).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn admitted_decision_reports_remaining_after_the_call() {
        let limiter = limiter_with(monthly_limit("helius", 100));

        let first = limiter.check_limit("helius", "rpc").await.unwrap();
        assert_eq!(first.monthly_usage, 1);
        assert_eq!(first.monthly_remaining, 99);
        assert_eq!(first.rps_remaining, 9.0);
    }

    #[tokio::test]
    async fn monthly_counter_resets_once_per_month() {
        let limiter = limiter_with(monthly_limit("helius", 2));
        for _ in 0..2 {
            limiter.check_limit("helius", "rpc").await.unwrap();
        }
        assert!(!limiter.check_limit("helius", "rpc").await.unwrap().allowed);

        assert_eq!(limiter.reset_monthly_counters().await, 0, "same month is a no-op");
        assert_eq!(limiter.monthly_usage("helius").await, 2);

        let next_month = next_month_reset(&Local::now()) + chrono::Duration::hours(1);
        assert_eq!(limiter.reset_monthly_counters_at(next_month).await, 1);
        assert_eq!(limiter.monthly_usage("helius").await, 0);
        assert_eq!(limiter.reset_monthly_counters_at(next_month).await, 0);
    }

    #[tokio::test]
    async fn status_thresholds_follow_monthly_utilisation() {
        let cases = [(5, HealthStatus::Healthy), (7, HealthStatus::Warning), (9, HealthStatus::Critical)];

        for (calls, expected) in cases {
            let limiter = limiter_with(monthly_limit("helius", 10));
            for _ in 0..calls {
                limiter.check_limit("helius", "rpc").await.unwrap();
            }
            let status = limiter.status("helius").await.unwrap();
            assert_eq!(status.status, expected, "{} of 10 monthly calls", calls);
            assert_eq!(status.monthly_usage, calls);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_all_and_cleanup() {
        let limiter = limiter_with(|_| {});
        for i in 0..3 {
            limiter.check_limit("syndica", &format!("e{}", i)).await.unwrap();
        }

        let report = limiter.status_all().await;
        assert_eq!(report.len(), 4);
        assert_eq!(report["syndica"].current_rps, 3.0 / 60.0);
        assert_eq!(report["helius"].current_rps, 0.0);

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(limiter.cleanup().await, 3);
        assert_eq!(limiter.cleanup().await, 0);
        assert_eq!(limiter.status("syndica").await.unwrap().current_rps, 0.0);
        assert_eq!(limiter.monthly_usage("syndica").await, 3, "cleanup keeps monthly usage");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_call_fires_after_retry_and_is_recorded() {
        let limiter = limiter_with(|_| {});
        for _ in 0..10 {
            limiter.check_limit("helius", "rpc").await.unwrap();
        }

        let started = tokio::time::Instant::now();
        let result: Result<u32, RateLimitError> = limiter
            .queue_request("helius", "rpc", || async { Ok(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(limiter.monthly_usage("helius").await, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_calls_fire_at_their_own_deadline() {
        let limiter = limiter_with(|_| {});
        for _ in 0..10 {
            limiter.check_limit("helius", "rpc").await.unwrap();
        }

        let started = tokio::time::Instant::now();
        let calls = (0..5).map(|i| {
            let limiter = limiter.clone();
            async move {
                let result: Result<u32, RateLimitError> = limiter
                    .queue_request("helius", "rpc", move || async move {
                        // A slow upstream must not hold up the calls queued behind it
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        Ok(i)
                    })
                    .await;
                (result.unwrap(), started.elapsed())
            }
        });
        let finished = futures::future::join_all(calls).await;

        for (i, (value, elapsed)) in finished.into_iter().enumerate() {
            assert_eq!(value, i as u32);
            assert!(
                elapsed >= Duration::from_secs(4) && elapsed < Duration::from_millis(4500),
                "call {} finished after {:?}",
                i,
                elapsed
            );
        }
        assert_eq!(limiter.monthly_usage("helius").await, 15);
    }

    #[tokio::test]
    async fn admitted_call_runs_immediately() {
        let limiter = limiter_with(|_| {});
        let result: Result<&str, RateLimitError> = limiter
            .queue_request("syndica", "rpc", || async { Ok("done") })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(limiter.monthly_usage("syndica").await, 1);
    }

    #[tokio::test]
    async fn monthly_denial_is_not_queued() {
        let limiter = limiter_with(monthly_limit("helius", 1));
        limiter.check_limit("helius", "rpc").await.unwrap();

        let result: Result<(), RateLimitError> = limiter
            .queue_request("helius", "rpc", || async { Err(RateLimitError::QueueClosed) })
            .await;

        match result {
            Err(RateLimitError::Limited { decision, .. }) => {
                assert_eq!(decision.retry_after_secs, None);
                assert_eq!(decision.monthly_remaining, 0);
            }
            other => panic!("expected a monthly denial, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_is_rate_limited() {
        let mut config = RateLimitConfig::default();
        config
            .update_provider(
                "solana",
                ProviderUpdate {
                    rps_limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        let limiter = RateLimiter::new(config.into_shared(), 1);
        limiter.check_limit("solana", "rpc").await.unwrap();

        // The first queued call is held by the worker, the second fills the channel
        for _ in 0..2 {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _: Result<(), RateLimitError> =
                    limiter.queue_request("solana", "rpc", || async { Ok(()) }).await;
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result: Result<(), RateLimitError> =
            limiter.queue_request("solana", "rpc", || async { Ok(()) }).await;
        assert!(matches!(result, Err(RateLimitError::QueueFull { .. })));
    }

    #[tokio::test]
    async fn shutdown_closes_the_queue() {
        let limiter = limiter_with(monthly_limit("solana", 100));
        limiter.check_limit("solana", "rpc").await.unwrap();
        limiter.check_limit("solana", "rpc").await.unwrap();
        limiter.shutdown();

        let result: Result<(), RateLimitError> =
            limiter.queue_request("solana", "rpc", || async { Ok(()) }).await;
        assert!(matches!(result, Err(RateLimitError::QueueClosed)));
    }
}
