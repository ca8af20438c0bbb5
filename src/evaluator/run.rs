use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::batch::ParseStrategy;
use crate::dataset::StandardizedDataset;
use crate::error::InferenceError;
use crate::inference::{InferenceBackend, InferenceRequest};
use crate::metric::{ensure_finite, Metric};

use super::state::EvalState;
use super::types::{
    EvaluationFailure, EvaluationResult, RecordFailurePolicy, ScoreResult, ScoringMode,
    SkippedRecord,
};

/// Calls the backend, turning an elapsed `limit` into an `Other` error.
pub(super) async fn invoke_with_timeout(
    backend: &dyn InferenceBackend,
    request: &InferenceRequest,
    limit: Option<Duration>,
) -> Result<String, InferenceError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, backend.invoke(request))
            .await
            .unwrap_or_else(|_| {
                Err(InferenceError::other(format!(
                    "inference call to {} timed out after {} ms",
                    backend.name(),
                    limit.as_millis()
                )))
            }),
        None => backend.invoke(request).await,
    }
}

/// Bookkeeping shared by both evaluators for a single run.
pub(super) struct Run {
    run_id: Uuid,
    model_id: String,
    started_at: chrono::DateTime<Utc>,
    policy: RecordFailurePolicy,
    scoring: ScoringMode,
    dataset_size: usize,
    records: Vec<ScoreResult>,
    skipped: Vec<SkippedRecord>,
    predictions: Vec<Option<String>>,
    batch_score: Option<f32>,
    metric_error: Option<String>,
    pub(super) calls_made: usize,
    pub(super) processed_count: usize,
    pub(super) parse_strategies: Vec<ParseStrategy>,
}

impl Run {
    pub(super) fn new(
        model_id: &str,
        dataset_size: usize,
        policy: RecordFailurePolicy,
        scoring: ScoringMode,
    ) -> Self {
        let run_id = Uuid::new_v4();
        log::info!("evaluation {run_id} started for {model_id} over {dataset_size} records");
        Self {
            run_id,
            model_id: model_id.to_string(),
            started_at: Utc::now(),
            policy,
            scoring,
            dataset_size,
            records: Vec::with_capacity(dataset_size),
            skipped: Vec::new(),
            predictions: vec![None; dataset_size],
            batch_score: None,
            metric_error: None,
            calls_made: 0,
            processed_count: 0,
            parse_strategies: Vec::new(),
        }
    }

    /// Records the output for `index` and, in per-record mode, scores it.
    pub(super) async fn observe(
        &mut self,
        metric: &dyn Metric,
        index: usize,
        output: Option<&str>,
        expected: &str,
    ) {
        if let Some(slot) = self.predictions.get_mut(index) {
            *slot = output.map(str::to_string);
        }
        if self.scoring == ScoringMode::Batch {
            return;
        }
        let Some(output) = output else {
            self.absorb(index, "no output was parsed for this record".to_string());
            return;
        };
        match metric.apply(output, expected).await.and_then(ensure_finite) {
            Ok(score) => self.records.push(ScoreResult {
                index,
                score,
                error: None,
            }),
            Err(err) => {
                log::warn!("metric {} failed on record {index}: {err}", metric.name());
                self.absorb(index, err.to_string());
            }
        }
    }

    /// Batch scoring: one `batch_apply` over every record that has an output.
    pub(super) async fn score_batch(&mut self, metric: &dyn Metric, dataset: &StandardizedDataset) {
        let mut predicted = Vec::with_capacity(self.dataset_size);
        let mut expected = Vec::with_capacity(self.dataset_size);
        for (index, record) in dataset.iter().enumerate().take(self.processed_count) {
            match self.predictions.get(index).cloned().flatten() {
                Some(output) => predicted.push(output),
                None => match self.policy {
                    RecordFailurePolicy::ZeroScore => predicted.push(String::new()),
                    RecordFailurePolicy::Skip => {
                        self.skipped.push(SkippedRecord {
                            index,
                            reason: "no output was parsed for this record".to_string(),
                        });
                        continue;
                    }
                },
            }
            expected.push(record.expected_output.clone());
        }
        if predicted.is_empty() {
            self.batch_score = Some(0.0);
            return;
        }
        match metric
            .batch_apply(&predicted, &expected)
            .await
            .and_then(ensure_finite)
        {
            Ok(score) => self.batch_score = Some(score),
            Err(err) => {
                log::warn!("batch metric {} failed: {err}", metric.name());
                self.metric_error = Some(err.to_string());
                self.batch_score = Some(0.0);
            }
        }
    }

    fn absorb(&mut self, index: usize, reason: String) {
        match self.policy {
            RecordFailurePolicy::ZeroScore => self.records.push(ScoreResult {
                index,
                score: 0.0,
                error: Some(reason),
            }),
            RecordFailurePolicy::Skip => self.skipped.push(SkippedRecord { index, reason }),
        }
    }

    pub(super) fn finish(self) -> EvaluationResult {
        let average = self.batch_score.unwrap_or_else(|| {
            if self.records.is_empty() {
                0.0
            } else {
                self.records.iter().map(|r| r.score).sum::<f32>() / self.records.len() as f32
            }
        });
        log::info!(
            "evaluation {} finished: average {average:.4} over {} records ({} skipped, {} calls)",
            self.run_id,
            self.records.len(),
            self.skipped.len(),
            self.calls_made
        );
        self.into_result(EvalState::Done, average, None)
    }

    /// Discards partial scores; every record carries the failure message.
    pub(super) fn fail(mut self, err: &InferenceError) -> EvaluationResult {
        let message = err.kind.user_message().to_string();
        log::error!(
            "evaluation {} for {} failed: {err}",
            self.run_id,
            self.model_id
        );
        self.records = (0..self.dataset_size)
            .map(|index| ScoreResult {
                index,
                score: 0.0,
                error: Some(message.clone()),
            })
            .collect();
        self.skipped.clear();
        self.batch_score = None;
        let failure = EvaluationFailure {
            kind: err.kind,
            message,
            detail: err.message.clone(),
        };
        self.into_result(EvalState::Failed, 0.0, Some(failure))
    }

    fn into_result(
        self,
        state: EvalState,
        average: f32,
        failure: Option<EvaluationFailure>,
    ) -> EvaluationResult {
        EvaluationResult {
            run_id: self.run_id,
            model_id: self.model_id,
            state,
            dataset_size: self.dataset_size,
            records: self.records,
            skipped: self.skipped,
            predictions: self.predictions,
            average,
            failure,
            metric_error: self.metric_error,
            calls_made: self.calls_made,
            processed_count: self.processed_count,
            parse_strategies: self.parse_strategies,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
