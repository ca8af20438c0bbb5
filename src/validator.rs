//! Smoke test for a candidate metric before it is trusted.

#[path = "validator/report.rs"]
mod report;

#[path = "validator/check.rs"]
mod check;

pub use check::{MetricValidator, DEFAULT_SAMPLE_SIZE};
pub use report::{SampleOutcome, ScoreDistribution, ValidationReport, ValidationWarning};
