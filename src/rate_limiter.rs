use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Enforces a minimum spacing between outbound calls.
///
/// The spacing is `1 / requests_per_second`. A budget of zero or less (or a
/// non-finite one) disables limiting entirely. The lock is held across the
/// sleep, so concurrent callers are released one interval apart in arrival
/// order.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    min_interval: Option<Duration>,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter for the given requests-per-second budget.
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = (requests_per_second.is_finite() && requests_per_second > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / requests_per_second));
        Self {
            requests_per_second,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Creates a limiter that never waits.
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    /// Minimum spacing between two acquisitions, `None` when disabled.
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    pub fn is_enabled(&self) -> bool {
        self.min_interval.is_some()
    }

    /// Waits until the next call is allowed and records it.
    pub async fn acquire(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                log::debug!("rate limiter sleeping {} ms", wait.as_millis());
                sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LimiterKey {
    backend: String,
    model_id: String,
}

/// Hands out limiters shared per `(backend, model)` pair.
///
/// Evaluators that target the same backend and model through one registry
/// share a single timestamp; different targets are limited independently.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_rps: f64,
    overrides: HashMap<LimiterKey, f64>,
    limiters: StdMutex<HashMap<LimiterKey, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(default_rps: f64) -> Self {
        Self {
            default_rps,
            overrides: HashMap::new(),
            limiters: StdMutex::new(HashMap::new()),
        }
    }

    /// Uses a different budget for one backend/model pair.
    pub fn with_override(mut self, backend: &str, model_id: &str, rps: f64) -> Self {
        self.overrides.insert(key(backend, model_id), rps);
        self
    }

    /// Returns the shared limiter for a target, creating it on first use.
    pub fn limiter_for(&self, backend: &str, model_id: &str) -> Arc<RateLimiter> {
        let key = key(backend, model_id);
        let rps = self.overrides.get(&key).copied().unwrap_or(self.default_rps);
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        limiters
            .entry(key)
            .or_insert_with(|| Arc::new(RateLimiter::new(rps)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.limiters
            .lock()
            .map(|limiters| limiters.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(backend: &str, model_id: &str) -> LimiterKey {
    LimiterKey {
        backend: backend.to_string(),
        model_id: model_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use rstest::rstest;

    #[tokio::test]
    async fn two_calls_at_two_rps_are_half_a_second_apart() {
        let limiter = RateLimiter::new(2.0);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(490));
    }

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(0.5);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-3.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[tokio::test]
    async fn non_positive_budget_disables_limiting(#[case] rps: f64) {
        let limiter = RateLimiter::new(rps);
        assert!(!limiter.is_enabled());
        let start = std::time::Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(10.0));
        let start = Instant::now();
        let tasks = (0..4).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        });
        let mut stamps: Vec<Instant> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn registry_shares_limiters_per_target() {
        let registry = RateLimiterRegistry::new(1.0).with_override("bedrock", "fast-model", 5.0);
        let a = registry.limiter_for("bedrock", "slow-model");
        let b = registry.limiter_for("bedrock", "slow-model");
        let c = registry.limiter_for("bedrock", "fast-model");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.requests_per_second(), 5.0);
        assert_eq!(a.min_interval(), Some(Duration::from_secs(1)));
        assert_eq!(registry.len(), 2);
    }
}
