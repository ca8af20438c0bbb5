use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evaluator::{EvaluatorConfig, RecordFailurePolicy, ScoringMode};
use crate::inference::{InferenceConfig, ResilienceConfig};

use super::error::ConfigError;

const DEFAULT_REQUESTS_PER_SECOND: f64 = 1.0;
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EvalConfig {
    pub rate_limit: RateLimitConfig,
    pub inference: InferenceSettings,
    pub batching: BatchingConfig,
    pub failures: FailureConfig,
    pub backend: BackendConfig,
    pub resilience: ResilienceConfig,
    pub logging: LoggingConfig,
}

impl EvalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rps = self.rate_limit.requests_per_second;
        if !rps.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.requests_per_second must be finite, got {rps}"
            )));
        }
        if self.batching.batch_size == Some(0) {
            return Err(ConfigError::Invalid(
                "batching.batch_size must be greater than 0".to_string(),
            ));
        }
        let temperature = self.inference.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid(format!(
                "inference.temperature must be within [0, 2], got {temperature}"
            )));
        }
        let top_p = self.inference.top_p;
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "inference.top_p must be within (0, 1], got {top_p}"
            )));
        }
        if self.inference.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "inference.max_tokens must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the one-call-per-batch path.
    pub fn batched_evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            failure_policy: self.failures.batched,
            ..self.base_evaluator_config()
        }
    }

    /// Settings for the one-call-per-record path.
    pub fn bounded_evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            failure_policy: self.failures.bounded,
            ..self.base_evaluator_config()
        }
    }

    fn base_evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            requests_per_second: self.rate_limit.requests_per_second,
            inference: self.inference.params(),
            timeout: self.inference.timeout(),
            batch_size: self.batching.batch_size,
            scoring: self.batching.scoring,
            failure_policy: RecordFailurePolicy::ZeroScore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Zero or less disables limiting
    pub requests_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub model_id: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: Option<u64>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let params = InferenceConfig::default();
        Self {
            model_id: None,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            timeout_seconds: None,
        }
    }
}

impl InferenceSettings {
    pub fn params(&self) -> InferenceConfig {
        InferenceConfig {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub enabled: bool,
    /// Records per call; unset sends the whole dataset in one call
    pub batch_size: Option<usize>,
    pub scoring: ScoringMode,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: None,
            scoring: ScoringMode::PerRecord,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailureConfig {
    pub batched: RecordFailurePolicy,
    pub bounded: RecordFailurePolicy,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            batched: RecordFailurePolicy::ZeroScore,
            bounded: RecordFailurePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Openai,
    Bedrock,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub region: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file; logs go to stderr when unset
    pub path: Option<String>,
    /// Bytes before a log file is rotated
    pub rotate_size: u64,
    pub rotate_keep: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: None,
            rotate_size: 10 * 1024 * 1024,
            rotate_keep: 5,
        }
    }
}
