//! Scoring capability and its implementations.
//!
//! Built-in metrics run in-process. Anything user supplied runs behind
//! [`ProcessMetric`], in a child process with a cleared environment, and
//! should pass the [`MetricValidator`](crate::validator::MetricValidator)
//! before it is used.

#[path = "metric/traits.rs"]
mod traits;

#[path = "metric/builtin.rs"]
mod builtin;

#[path = "metric/manifest.rs"]
mod manifest;

#[path = "metric/process.rs"]
mod process;

pub use builtin::{builtin_metric, Contains, ExactMatch, TokenF1, BUILTIN_METRICS};
pub use manifest::MetricManifest;
pub use process::ProcessMetric;
pub use traits::{ensure_finite, mean_of_apply, Metric};
