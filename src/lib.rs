//! Batched, rate-limited evaluation of LLM outputs against labeled datasets.
//!
//! An evaluator takes a dataset, an inference backend and a metric. The
//! [`evaluator::BatchedEvaluator`] packs many records into one call and splits
//! the reply back into per-record outputs; the [`evaluator::BoundedEvaluator`]
//! makes one call per record. Both share the same rate limiting, failure policy
//! and result shape. Untrusted metrics run out of process and are vetted by the
//! [`validator::MetricValidator`] first.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use batch_eval::dataset::{DatasetRecord, InMemoryDataset, StandardizedDataset};
//! use batch_eval::evaluator::{BatchedEvaluator, EvaluatorConfig};
//! use batch_eval::inference::OpenAICompatible;
//! use batch_eval::metric::ExactMatch;
//!
//! # async fn run() -> Result<(), batch_eval::error::InferenceError> {
//! let dataset: StandardizedDataset = vec![DatasetRecord::new("2 + 2", "4")].into_iter().collect();
//! let backend = OpenAICompatible::from_env(None, "OPENAI_API_KEY");
//! let evaluator = BatchedEvaluator::new(
//!     Arc::new(backend),
//!     Arc::new(ExactMatch::default()),
//!     Arc::new(InMemoryDataset::new(dataset)),
//!     EvaluatorConfig::batched(),
//! );
//! let result = evaluator.aggregate_score("gpt-4o-mini").await;
//! println!("average: {}", result.average);
//! # Ok(())
//! # }
//! ```

/// Packing many inputs into one prompt and splitting the reply
pub mod batch;

/// TOML configuration and validation
pub mod config;

/// Records and dataset adapters
pub mod dataset;

/// Error types shared across the crate
pub mod error;

/// Batched and bounded evaluators
pub mod evaluator;

/// Inference backends, requests and the retry wrapper
pub mod inference;

/// Metric trait, built-in metrics and out-of-process plugins
pub mod metric;

/// Prompt adapters and template rendering
pub mod prompt;

/// Minimum-interval rate limiting
pub mod rate_limiter;

/// Pre-flight checks for candidate metrics
pub mod validator;

pub use error::{InferenceError, InferenceErrorKind, MetricError};
pub use evaluator::{BatchedEvaluator, BoundedEvaluator, EvaluationResult, EvaluatorConfig};
pub use inference::InferenceBackend;
pub use metric::Metric;
