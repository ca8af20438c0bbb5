use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MetricError;

/// Scores predictions against expected outputs.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Scores one prediction, usually in `[0, 1]`.
    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError>;

    /// One aggregate score over many records, for metrics that compare
    /// records against each other. Defaults to the mean of [`Metric::apply`].
    async fn batch_apply(
        &self,
        predicted: &[String],
        expected: &[String],
    ) -> Result<f32, MetricError> {
        mean_of_apply(self, predicted, expected).await
    }
}

#[async_trait]
impl<T: Metric + ?Sized> Metric for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        (**self).apply(predicted, expected).await
    }

    async fn batch_apply(
        &self,
        predicted: &[String],
        expected: &[String],
    ) -> Result<f32, MetricError> {
        (**self).batch_apply(predicted, expected).await
    }
}

/// Mean of per-record scores; the first failing record fails the batch.
pub async fn mean_of_apply<M: Metric + ?Sized>(
    metric: &M,
    predicted: &[String],
    expected: &[String],
) -> Result<f32, MetricError> {
    if predicted.len() != expected.len() {
        return Err(MetricError::Execution(format!(
            "got {} predictions for {} expected outputs",
            predicted.len(),
            expected.len()
        )));
    }
    if predicted.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0f32;
    for (p, e) in predicted.iter().zip(expected) {
        total += ensure_finite(metric.apply(p, e).await?)?;
    }
    Ok(total / predicted.len() as f32)
}

/// Rejects NaN and infinite scores.
pub fn ensure_finite(score: f32) -> Result<f32, MetricError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(MetricError::NonNumeric(score.to_string()))
    }
}
