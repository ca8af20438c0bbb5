use std::sync::Arc;

use crate::batch::{parse_batch_response, BatchPromptBuilder, ParseStrategy};
use crate::dataset::DatasetAdapter;
use crate::inference::{ChatMessage, InferenceBackend, InferenceRequest};
use crate::metric::Metric;
use crate::prompt::{PromptAdapter, TemplatePrompt};
use crate::rate_limiter::RateLimiter;

use super::run::{invoke_with_timeout, Run};
use super::state::{EvalState, StateTracker};
use super::types::{EvaluationResult, EvaluatorConfig, ScoringMode};

/// Evaluator packing many records into each inference call.
///
/// The whole dataset (or each `batch_size` chunk of it) goes out as one user
/// message with no system prompt. The reply is parsed back into one output per
/// record, and output `i` is scored against record `i`. A backend error aborts
/// the run in [`EvalState::Failed`] without retrying.
pub struct BatchedEvaluator {
    backend: Arc<dyn InferenceBackend>,
    metric: Arc<dyn Metric>,
    dataset: Arc<dyn DatasetAdapter>,
    prompt: Arc<dyn PromptAdapter>,
    limiter: Arc<RateLimiter>,
    config: EvaluatorConfig,
}

impl BatchedEvaluator {
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

    /// Its system prompt becomes the batch instructions; its template renders each input.
    pub fn prompt(mut self, prompt: Arc<dyn PromptAdapter>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn prompt_builder(&self) -> BatchPromptBuilder {
        match self.prompt.system_prompt() {
            Some(instructions) => BatchPromptBuilder::new().instructions(instructions),
            None => BatchPromptBuilder::new(),
        }
    }

    pub async fn aggregate_score(&self, model_id: &str) -> EvaluationResult {
        let mut state = StateTracker::new();
        let dataset = self.dataset.standardized_dataset();
        let total = dataset.len();
        let mut run = Run::new(
            model_id,
            total,
            self.config.failure_policy,
            self.config.scoring,
        );

        if total == 0 {
            log::info!("dataset is empty, nothing to evaluate");
            state.advance(EvalState::Done);
            return run.finish();
        }

        let chunk_size = self.config.batch_size.unwrap_or(total).max(1);
        let builder = self.prompt_builder();

        for (chunk_index, chunk) in dataset.records().chunks(chunk_size).enumerate() {
            let offset = chunk_index * chunk_size;

            state.advance(EvalState::BuildingPrompt);
            let inputs: Vec<String> = chunk.iter().map(|r| self.prompt.render(r)).collect();
            let request = InferenceRequest::new(model_id, self.config.inference)
                .message(ChatMessage::user(builder.build(&inputs)));

            state.advance(EvalState::AwaitingResponse);
            self.limiter.acquire().await;
            run.calls_made += 1;
            let reply =
                match invoke_with_timeout(&*self.backend, &request, self.config.timeout).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        state.advance(EvalState::Failed);
                        return run.fail(&err);
                    }
                };

            state.advance(EvalState::Parsing);
            let parsed = parse_batch_response(&reply, chunk.len());
            match parsed.strategy {
                ParseStrategy::Degraded => log::warn!(
                    "could not split reply for records {offset}..{}, scoring the whole reply against each",
                    offset + chunk.len()
                ),
                _ if parsed.len() < chunk.len() => log::warn!(
                    "reply held {} of {} outputs, trailing records have no output",
                    parsed.len(),
                    chunk.len()
                ),
                _ => {}
            }
            run.parse_strategies.push(parsed.strategy);

            state.advance(EvalState::Scoring);
            for (position, record) in chunk.iter().enumerate() {
                run.observe(
                    &*self.metric,
                    offset + position,
                    parsed.get(position),
                    &record.expected_output,
                )
                .await;
            }
            run.processed_count += chunk.len();
        }

        if self.config.scoring == ScoringMode::Batch {
            run.score_batch(&*self.metric, dataset).await;
        }
        state.advance(EvalState::Done);
        run.finish()
    }
}
