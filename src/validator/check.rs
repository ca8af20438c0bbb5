use crate::dataset::StandardizedDataset;
use crate::error::MetricError;
use crate::metric::{ensure_finite, Metric, MetricManifest, ProcessMetric};

use super::report::{SampleOutcome, ScoreDistribution, ValidationReport, ValidationWarning};

/// Most samples a validation run will score.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

const UNLOADED: &str = "<unloaded>";

/// Runs a candidate metric on a few records, feeding each record's expected
/// output back as the prediction.
///
/// Rejects the metric when it cannot be loaded or when no sample yields a
/// finite score. Samples that error are reported alongside the scored ones.
#[derive(Debug, Clone)]
pub struct MetricValidator {
    sample_size: usize,
}

impl Default for MetricValidator {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl MetricValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to `1..=DEFAULT_SAMPLE_SIZE`.
    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.clamp(1, DEFAULT_SAMPLE_SIZE);
        self
    }

    pub async fn validate(
        &self,
        metric: &dyn Metric,
        dataset: &StandardizedDataset,
    ) -> ValidationReport {
        let name = metric.name().to_string();
        let sample = dataset.head(self.sample_size);
        if sample.is_empty() {
            return ValidationReport::rejected(name, "the dataset has no records to validate against");
        }

        let mut samples = Vec::with_capacity(sample.len());
        let mut scores = Vec::with_capacity(sample.len());
        for (index, record) in sample.iter().enumerate() {
            let expected = record.expected_output.as_str();
            match metric.apply(expected, expected).await.and_then(ensure_finite) {
                Ok(score) => {
                    scores.push(score);
                    samples.push(SampleOutcome {
                        index,
                        score: Some(score),
                        error: None,
                    });
                }
                Err(err) => {
                    log::warn!("metric {name} failed on validation sample {index}: {err}");
                    samples.push(SampleOutcome {
                        index,
                        score: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let Some(distribution) = ScoreDistribution::from_scores(&scores) else {
            let reason = format!(
                "none of the {} samples produced a numeric score",
                samples.len()
            );
            return ValidationReport {
                samples,
                ..ValidationReport::rejected(name, reason)
            };
        };

        let warnings = warnings_for(&scores, &distribution);
        for warning in &warnings {
            log::warn!("metric {name}: {warning}");
        }
        log::info!(
            "metric {name} accepted after {} samples ({} scored)",
            samples.len(),
            scores.len()
        );
        ValidationReport {
            metric_name: name,
            is_valid: true,
            reason: None,
            samples,
            distribution: Some(distribution),
            warnings,
        }
    }

    /// Hands back the metric only when validation accepts it.
    pub async fn admit<M: Metric>(
        &self,
        candidate: Result<M, MetricError>,
        dataset: &StandardizedDataset,
    ) -> Result<(M, ValidationReport), ValidationReport> {
        let metric = match candidate {
            Ok(metric) => metric,
            Err(err) => {
                log::error!("metric failed to load: {err}");
                return Err(ValidationReport::rejected(
                    UNLOADED,
                    format!("metric failed to load: {err}"),
                ));
            }
        };
        let report = self.validate(&metric, dataset).await;
        if report.is_valid {
            Ok((metric, report))
        } else {
            Err(report)
        }
    }

    /// Loads a plugin and validates it in one step.
    pub async fn validate_manifest(
        &self,
        manifest: MetricManifest,
        dataset: &StandardizedDataset,
    ) -> Result<(ProcessMetric, ValidationReport), ValidationReport> {
        let name = manifest.name.clone();
        self.admit(ProcessMetric::load(manifest).await, dataset)
            .await
            .map_err(|mut report| {
                if report.metric_name == UNLOADED {
                    report.metric_name = name;
                }
                report
            })
    }
}

fn warnings_for(scores: &[f32], distribution: &ScoreDistribution) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    if scores.len() > 1 && distribution.unique_count == 1 {
        warnings.push(ValidationWarning::NotDiscriminating);
    }
    if scores.iter().all(|&s| s == 1.0) {
        warnings.push(ValidationWarning::TooEasy);
    }
    if scores.iter().all(|&s| s == 0.0) {
        warnings.push(ValidationWarning::AllZero);
    }
    warnings
}
