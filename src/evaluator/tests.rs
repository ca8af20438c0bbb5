use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;

use super::*;
use crate::batch::ParseStrategy;
use crate::dataset::{DatasetRecord, InMemoryDataset, StandardizedDataset};
use crate::error::{InferenceError, InferenceErrorKind, MetricError};
use crate::inference::{ChatRole, InferenceBackend, InferenceRequest};
use crate::metric::{ExactMatch, Metric};
use crate::prompt::TemplatePrompt;
use crate::rate_limiter::RateLimiter;

/// Backend replaying canned replies and recording every request it receives.
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    fn new<I>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String, InferenceError>>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn ok<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Arc<Self> {
        Self::new(replies.into_iter().map(|r| Ok(r.into())))
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("unscripted".to_string()))
    }
}

/// Exact match that raises on the prediction "boom".
struct FragileMetric;

#[async_trait]
impl Metric for FragileMetric {
    fn name(&self) -> &str {
        "fragile"
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        if predicted == "boom" {
            return Err(MetricError::Execution("metric raised".to_string()));
        }
        Ok(if predicted.trim() == expected.trim() { 1.0 } else { 0.0 })
    }
}

/// Corpus-level metric returning a fixed aggregate.
struct CorpusMetric {
    batch_calls: AtomicUsize,
}

#[async_trait]
impl Metric for CorpusMetric {
    fn name(&self) -> &str {
        "corpus"
    }

    async fn apply(&self, _predicted: &str, _expected: &str) -> Result<f32, MetricError> {
        Err(MetricError::Execution("apply must not be called".to_string()))
    }

    async fn batch_apply(
        &self,
        predicted: &[String],
        expected: &[String],
    ) -> Result<f32, MetricError> {
        assert_eq!(predicted.len(), expected.len());
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(0.42)
    }
}

fn dataset(n: usize) -> Arc<InMemoryDataset> {
    let records = (0..n)
        .map(|i| DatasetRecord::new(format!("q{i}"), format!("a{i}")))
        .collect::<StandardizedDataset>();
    Arc::new(InMemoryDataset::new(records))
}

fn json_reply<S: AsRef<str>>(outputs: &[S]) -> String {
    let items: Vec<_> = outputs
        .iter()
        .map(|o| serde_json::json!({ "response": o.as_ref() }))
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn unlimited(config: EvaluatorConfig) -> EvaluatorConfig {
    config.requests_per_second(0.0)
}

fn batched(
    backend: Arc<ScriptedBackend>,
    metric: Arc<dyn Metric>,
    n: usize,
    config: EvaluatorConfig,
) -> BatchedEvaluator {
    BatchedEvaluator::new(backend, metric, dataset(n), unlimited(config))
}

fn bounded(
    backend: Arc<ScriptedBackend>,
    metric: Arc<dyn Metric>,
    n: usize,
    config: EvaluatorConfig,
) -> BoundedEvaluator {
    BoundedEvaluator::new(backend, metric, dataset(n), unlimited(config))
}

#[tokio::test]
async fn empty_dataset_scores_zero_without_calling_the_backend() {
    let backend = ScriptedBackend::ok(Vec::<String>::new());
    let evaluator = batched(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        0,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.state, EvalState::Done);
    assert_eq!(result.average, 0.0);
    assert!(result.records.is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn batched_call_maps_outputs_to_records_by_position() {
    let backend = ScriptedBackend::ok([json_reply(&["a0", "wrong", "a2"])]);
    let evaluator = batched(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.state, EvalState::Done);
    assert_eq!(backend.calls(), 1);
    assert_eq!(result.scores(), vec![1.0, 0.0, 1.0]);
    assert!((result.average - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(result.parse_strategies, vec![ParseStrategy::JsonArray]);
    assert_eq!(result.predictions[1].as_deref(), Some("wrong"));
    assert_eq!(result.processed_count, 3);
}

#[tokio::test]
async fn batched_call_sends_one_user_message_without_system_prompt() {
    let backend = ScriptedBackend::ok([json_reply(&["a0", "a1"])]);
    let prompt = TemplatePrompt::new("Question: {{input}}").system("Answer briefly.");
    let evaluator = batched(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        2,
        EvaluatorConfig::batched(),
    )
    .prompt(Arc::new(prompt));

    evaluator.aggregate_score("model-x").await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.model_id, "model-x");
    assert!(request.system_prompt.is_none());
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, ChatRole::User);
    let content = &request.messages[0].content;
    assert!(content.starts_with("Answer briefly."));
    assert!(content.contains("1. Question: q0"));
    assert!(content.contains("2. Question: q1"));
}

#[rstest]
#[case::expired(InferenceError::credentials_expired("token expired"))]
#[case::denied(InferenceError::access_denied("no access"))]
#[case::missing(InferenceError::credentials_missing("no key"))]
#[case::other(InferenceError::other("connection reset"))]
#[tokio::test]
async fn backend_error_fails_the_whole_evaluation(#[case] error: InferenceError) {
    let kind = error.kind;
    let backend = ScriptedBackend::new([Err(error)]);
    let evaluator = batched(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert!(result.is_failed());
    assert_eq!(result.error_kind(), Some(kind));
    assert_eq!(result.average, 0.0);
    assert_eq!(result.records.len(), 3);
    assert!(result
        .records
        .iter()
        .all(|r| r.score == 0.0 && r.error.as_deref() == Some(kind.user_message())));
    assert_eq!(backend.calls(), 1, "no retry inside the evaluator");
}

#[tokio::test]
async fn expired_credentials_get_their_own_message() {
    let backend = ScriptedBackend::new([Err(InferenceError::credentials_expired("ExpiredToken"))]);
    let evaluator = batched(
        backend,
        Arc::new(ExactMatch::default()),
        1,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;
    let failure = result.failure.expect("failure is reported");

    assert_eq!(failure.kind, InferenceErrorKind::CredentialsExpired);
    assert_eq!(
        failure.message,
        InferenceErrorKind::CredentialsExpired.user_message()
    );
    assert_ne!(
        failure.message,
        InferenceErrorKind::Other.user_message(),
        "expired credentials must not look like a generic failure"
    );
    assert_eq!(failure.detail, "ExpiredToken");
}

#[tokio::test]
async fn metric_error_scores_zero_and_counts_in_the_mean() {
    let backend = ScriptedBackend::ok([json_reply(&["a0", "boom", "a2", "a3"])]);
    let evaluator = batched(
        backend,
        Arc::new(FragileMetric),
        4,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.state, EvalState::Done);
    assert_eq!(result.records.len(), 4);
    assert_eq!(result.records[1].score, 0.0);
    assert!(result.records[1].error.is_some());
    assert!((result.average - 0.75).abs() < 1e-6);
}

#[rstest]
#[case::zero_score(RecordFailurePolicy::ZeroScore, 3, 0)]
#[case::skip(RecordFailurePolicy::Skip, 2, 1)]
#[tokio::test]
async fn short_reply_leaves_trailing_records_without_output(
    #[case] policy: RecordFailurePolicy,
    #[case] counted: usize,
    #[case] skipped: usize,
) {
    let backend = ScriptedBackend::ok([json_reply(&["a0", "a1"])]);
    let evaluator = batched(
        backend,
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::batched().failure_policy(policy),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.records.len(), counted);
    assert_eq!(result.skipped.len(), skipped);
    assert!(result.predictions[2].is_none());
    let expected = 2.0 / counted as f32;
    assert!((result.average - expected).abs() < 1e-6);
}

#[tokio::test]
async fn unstructured_reply_is_scored_against_every_record() {
    let backend = ScriptedBackend::ok(["a1"]);
    let evaluator = batched(
        backend,
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::batched(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.parse_strategies, vec![ParseStrategy::Degraded]);
    assert_eq!(result.scores(), vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn sub_batches_keep_global_positions() {
    let backend = ScriptedBackend::ok([
        json_reply(&["a0", "a1"]),
        json_reply(&["a2", "x"]),
        json_reply(&["a4"]),
    ]);
    let evaluator = batched(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        5,
        EvaluatorConfig::batched().batch_size(2),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(backend.calls(), 3);
    assert_eq!(result.calls_made, 3);
    let indices: Vec<_> = result.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(result.scores(), vec![1.0, 1.0, 1.0, 0.0, 1.0]);
    assert!(backend.requests()[2].messages[0]
        .content
        .contains("You will receive 1 inputs"));
}

#[tokio::test]
async fn failure_in_a_later_sub_batch_discards_earlier_scores() {
    let backend = ScriptedBackend::new([
        Ok(json_reply(&["a0", "a1"])),
        Err(InferenceError::access_denied("denied")),
    ]);
    let evaluator = batched(
        backend,
        Arc::new(ExactMatch::default()),
        4,
        EvaluatorConfig::batched().batch_size(2),
    );

    let result = evaluator.aggregate_score("model").await;

    assert!(result.is_failed());
    assert_eq!(result.average, 0.0);
    assert!(result.records.iter().all(|r| r.score == 0.0));
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out_as_failure() {
    let backend = ScriptedBackend::slow(Duration::from_secs(60));
    let evaluator = batched(
        backend,
        Arc::new(ExactMatch::default()),
        2,
        EvaluatorConfig::batched().timeout(Duration::from_secs(5)),
    );

    let result = evaluator.aggregate_score("model").await;

    assert!(result.is_failed());
    assert_eq!(result.error_kind(), Some(InferenceErrorKind::Other));
    assert!(result.failure.unwrap().detail.contains("timed out"));
}

#[tokio::test]
async fn batch_scoring_mode_calls_batch_apply_once() {
    let metric = Arc::new(CorpusMetric {
        batch_calls: AtomicUsize::new(0),
    });
    let backend = ScriptedBackend::ok([json_reply(&["a0", "a1", "a2"])]);
    let evaluator = batched(
        backend,
        metric.clone(),
        3,
        EvaluatorConfig::batched().scoring(ScoringMode::Batch),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.state, EvalState::Done);
    assert_eq!(metric.batch_calls.load(Ordering::SeqCst), 1);
    assert!((result.average - 0.42).abs() < 1e-6);
    assert!(result.records.is_empty());
}

#[tokio::test]
async fn bounded_makes_one_call_per_record_with_system_prompt() {
    let backend = ScriptedBackend::ok(["a0", "nope", "a2"]);
    let prompt = TemplatePrompt::new("Q: {{input}}").system("Be exact.");
    let evaluator = bounded(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::bounded(),
    )
    .prompt(Arc::new(prompt));

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.state, EvalState::Done);
    assert_eq!(backend.calls(), 3);
    assert_eq!(result.processed_count, 3);
    assert!((result.average - 2.0 / 3.0).abs() < 1e-6);
    for (i, request) in backend.requests().iter().enumerate() {
        assert_eq!(request.system_prompt.as_deref(), Some("Be exact."));
        assert_eq!(request.messages[0].content, format!("Q: q{i}"));
    }
}

#[rstest]
#[case::skip(RecordFailurePolicy::Skip, 2.0 / 3.0, 1)]
#[case::zero_score(RecordFailurePolicy::ZeroScore, 0.5, 0)]
#[tokio::test]
async fn bounded_metric_errors_follow_the_policy(
    #[case] policy: RecordFailurePolicy,
    #[case] average: f32,
    #[case] skipped: usize,
) {
    let backend = ScriptedBackend::ok(["a0", "boom", "a2", "wrong"]);
    let evaluator = bounded(
        backend,
        Arc::new(FragileMetric),
        4,
        EvaluatorConfig::bounded().failure_policy(policy),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.skipped.len(), skipped);
    assert!((result.average - average).abs() < 1e-6);
}

#[tokio::test]
async fn bounded_never_processes_more_records_than_the_dataset_holds() {
    let backend = ScriptedBackend::ok(["a0", "a1", "a2", "extra", "extra"]);
    let evaluator = bounded(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::bounded(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert_eq!(result.processed_count, 3);
    assert_eq!(backend.calls(), 3);
    assert_eq!(result.average, 1.0);
}

#[tokio::test]
async fn bounded_backend_error_fails_the_evaluation() {
    let backend = ScriptedBackend::new([
        Ok("a0".to_string()),
        Err(InferenceError::credentials_expired("expired")),
    ]);
    let evaluator = bounded(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        3,
        EvaluatorConfig::bounded(),
    );

    let result = evaluator.aggregate_score("model").await;

    assert!(result.is_failed());
    assert_eq!(
        result.error_kind(),
        Some(InferenceErrorKind::CredentialsExpired)
    );
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn shared_limiter_spaces_calls_across_evaluators() {
    let limiter = Arc::new(RateLimiter::new(1.0));
    let backend = ScriptedBackend::ok(["a0", "a0"]);
    let first = bounded(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        1,
        EvaluatorConfig::bounded(),
    )
    .rate_limiter(limiter.clone());
    let second = bounded(
        backend.clone(),
        Arc::new(ExactMatch::default()),
        1,
        EvaluatorConfig::bounded(),
    )
    .rate_limiter(limiter);

    let start = tokio::time::Instant::now();
    first.aggregate_score("model").await;
    second.aggregate_score("model").await;

    assert!(start.elapsed() >= Duration::from_millis(990));
    assert_eq!(backend.calls(), 2);
}
