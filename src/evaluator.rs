//! Scoring a model against a dataset, either one call per record or with
//! many records packed into each call.

#[path = "evaluator/types.rs"]
mod types;

#[path = "evaluator/state.rs"]
mod state;

#[path = "evaluator/run.rs"]
mod run;

#[path = "evaluator/bounded.rs"]
mod bounded;

#[path = "evaluator/batched.rs"]
mod batched;

#[cfg(test)]
#[path = "evaluator/tests.rs"]
mod tests;

pub use batched::BatchedEvaluator;
pub use bounded::BoundedEvaluator;
pub use state::EvalState;
pub use types::{
    EvaluationFailure, EvaluationResult, EvaluatorConfig, RecordFailurePolicy, ScoreResult,
    ScoringMode, SkippedRecord,
};
