use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::InferenceError;

use super::backend::InferenceBackend;
use super::request::InferenceRequest;

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

/// Configuration for retry and backoff behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Maximum number of attempts including the first one
    pub max_attempts: usize,
    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,
    /// Whether to subtract random jitter from backoff delays
    pub jitter: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

/// Backend wrapper that retries transient failures with exponential backoff.
///
/// Credential and authorization failures are returned on the first attempt.
pub struct ResilientBackend<B> {
    inner: B,
    cfg: ResilienceConfig,
}

impl<B: InferenceBackend> ResilientBackend<B> {
    pub fn new(inner: B, cfg: ResilienceConfig) -> Self {
        Self { inner, cfg }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn backoff_delay(&self, attempt_index: usize) -> Duration {
        let mut delay = self
            .cfg
            .base_delay_ms
            .saturating_mul(1u64 << attempt_index.min(16))
            .min(self.cfg.max_delay_ms);
        if self.cfg.jitter && delay > 1 {
            delay -= rand::thread_rng().gen_range(0..=delay / 2);
        }
        Duration::from_millis(delay)
    }
}

#[async_trait]
impl<B: InferenceBackend> InferenceBackend for ResilientBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let attempts = self.cfg.max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            match self.inner.invoke(request).await {
                Ok(text) => return Ok(text),
                Err(err) if !err.kind.is_transient() => return Err(err),
                Err(err) if attempt + 1 >= attempts => {
                    return Err(InferenceError::other(format!(
                        "retry attempts exceeded after {attempts} tries: {}",
                        err.message
                    )));
                }
                Err(err) => {
                    log::warn!(
                        "{} call failed (attempt {} of {attempts}): {err}",
                        self.inner.name(),
                        attempt + 1
                    );
                    sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
