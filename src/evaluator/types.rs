use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::ParseStrategy;
use crate::error::InferenceErrorKind;
use crate::inference::InferenceConfig;

use super::state::EvalState;

/// What happens to a record whose output is missing or whose metric call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailurePolicy {
    /// Keep the record with a score of 0.0; it still counts toward the mean
    ZeroScore,
    /// Leave the record out of the mean entirely
    Skip,
}

/// How the aggregate score is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// `Metric::apply` per record, averaged
    #[default]
    PerRecord,
    /// One `Metric::batch_apply` call over every collected output
    Batch,
}

/// Settings passed to an evaluator at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Zero or less disables rate limiting
    pub requests_per_second: f64,
    pub inference: InferenceConfig,
    /// Upper bound for one inference call
    pub timeout: Option<Duration>,
    /// Records per batched call; `None` packs the whole dataset. Ignored by
    /// the bounded evaluator.
    pub batch_size: Option<usize>,
    pub scoring: ScoringMode,
    pub failure_policy: RecordFailurePolicy,
}

impl EvaluatorConfig {
    /// Defaults for the batched path: failed records score 0.0.
    pub fn batched() -> Self {
        Self {
            requests_per_second: 1.0,
            inference: InferenceConfig::default(),
            timeout: None,
            batch_size: None,
            scoring: ScoringMode::PerRecord,
            failure_policy: RecordFailurePolicy::ZeroScore,
        }
    }

    /// Defaults for the bounded path: failed records are skipped.
    pub fn bounded() -> Self {
        Self {
            failure_policy: RecordFailurePolicy::Skip,
            ..Self::batched()
        }
    }

    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn failure_policy(mut self, policy: RecordFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Score for one record that counts toward the average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub index: usize,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record left out of the average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

/// Why a whole evaluation ended in [`EvalState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub kind: InferenceErrorKind,
    /// Message meant for the person who started the run
    pub message: String,
    /// Backend error text
    pub detail: String,
}

/// Outcome of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub run_id: Uuid,
    pub model_id: String,
    pub state: EvalState,
    pub dataset_size: usize,
    /// Records counted in the average, in dataset order
    pub records: Vec<ScoreResult>,
    pub skipped: Vec<SkippedRecord>,
    /// Model output per record, `None` where nothing was obtained
    pub predictions: Vec<Option<String>>,
    pub average: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<EvaluationFailure>,
    /// Set when `batch_apply` failed in batch scoring mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_error: Option<String>,
    pub calls_made: usize,
    pub processed_count: usize,
    pub parse_strategies: Vec<ParseStrategy>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn scores(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.score).collect()
    }

    pub fn is_failed(&self) -> bool {
        self.state == EvalState::Failed
    }

    pub fn error_kind(&self) -> Option<InferenceErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}
