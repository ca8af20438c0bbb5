use std::sync::Arc;

use crate::dataset::DatasetAdapter;
use crate::inference::{ChatMessage, InferenceBackend, InferenceRequest};
use crate::metric::Metric;
use crate::prompt::{PromptAdapter, TemplatePrompt};
use crate::rate_limiter::RateLimiter;

use super::run::{invoke_with_timeout, Run};
use super::types::{EvaluationResult, EvaluatorConfig, ScoringMode};

/// Evaluator making one inference call per record.
///
/// Each call carries the prompt adapter's system prompt and the record rendered
/// through its user template. The loop never visits more records than the
/// dataset held when the run started.
pub struct BoundedEvaluator {
    backend: Arc<dyn InferenceBackend>,
    metric: Arc<dyn Metric>,
    dataset: Arc<dyn DatasetAdapter>,
    prompt: Arc<dyn PromptAdapter>,
    limiter: Arc<RateLimiter>,
    config: EvaluatorConfig,
}

impl BoundedEvaluator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        metric: Arc<dyn Metric>,
        dataset: Arc<dyn DatasetAdapter>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(config.requests_per_second)),
            prompt: Arc::new(TemplatePrompt::default()),
            backend,
            metric,
            dataset,
            config,
        }
    }

    pub fn prompt(mut self, prompt: Arc<dyn PromptAdapter>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Shares a limiter with other evaluators hitting the same backend and model.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub async fn aggregate_score(&self, model_id: &str) -> EvaluationResult {
        let dataset = self.dataset.standardized_dataset();
        let total = dataset.len();
        let mut run = Run::new(
            model_id,
            total,
            self.config.failure_policy,
            self.config.scoring,
        );

        for index in 0..total {
            if run.processed_count >= total {
                log::warn!("processed {} of {total} records, stopping", run.processed_count);
                break;
            }
            let Some(record) = dataset.get(index) else {
                log::warn!("record {index} vanished from the dataset, stopping");
                break;
            };
            run.processed_count += 1;

            let request = InferenceRequest::new(model_id, self.config.inference)
                .system_prompt(self.prompt.system_prompt())
                .message(ChatMessage::user(self.prompt.render(record)));

            self.limiter.acquire().await;
            run.calls_made += 1;
            let output =
                match invoke_with_timeout(&*self.backend, &request, self.config.timeout).await {
                    Ok(output) => output,
                    Err(err) => return run.fail(&err),
                };
            log::debug!("record {index}/{total} answered by {}", self.backend.name());
            run.observe(&*self.metric, index, Some(&output), &record.expected_output)
                .await;
        }

        if self.config.scoring == ScoringMode::Batch {
            run.score_batch(&*self.metric, dataset).await;
        }
        run.finish()
    }
}
