use std::fmt;

use serde::{Deserialize, Serialize};

/// Score or error for one validation sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub unique_count: usize,
}

impl ScoreDistribution {
    /// `None` when there is nothing to summarize.
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        // `+ 0.0` folds -0.0 into 0.0 before comparing bit patterns.
        let mut bits: Vec<u32> = scores.iter().map(|s| (s + 0.0).to_bits()).collect();
        bits.sort_unstable();
        bits.dedup();
        Some(Self {
            min,
            max,
            mean,
            unique_count: bits.len(),
        })
    }
}

/// Heuristic hints about a metric that scored its own ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Every sample got the same score
    NotDiscriminating,
    /// Every sample scored 1.0
    TooEasy,
    /// Every sample scored 0.0, usually a field-name mismatch
    AllZero,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationWarning::NotDiscriminating => {
                "all samples received the same score; the metric may not discriminate"
            }
            ValidationWarning::TooEasy => "all samples scored 1.0; the metric may be too easy",
            ValidationWarning::AllZero => {
                "all samples scored 0.0; check that the metric reads the right fields"
            }
        };
        f.write_str(text)
    }
}

/// Outcome of validating one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub metric_name: String,
    pub is_valid: bool,
    /// Why the metric was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub samples: Vec<SampleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<ScoreDistribution>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub(super) fn rejected(metric_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            is_valid: false,
            reason: Some(reason.into()),
            samples: Vec::new(),
            distribution: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_warning(&self, warning: ValidationWarning) -> bool {
        self.warnings.contains(&warning)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_valid { "accepted" } else { "rejected" };
        write!(f, "metric '{}' {verdict}", self.metric_name)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        if let Some(d) = &self.distribution {
            write!(
                f,
                "\n  scores: min {:.3}, max {:.3}, mean {:.3}, {} unique",
                d.min, d.max, d.mean, d.unique_count
            )?;
        }
        for warning in &self.warnings {
            write!(f, "\n  warning: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_counts_unique_scores() {
        let d = ScoreDistribution::from_scores(&[0.5, 1.0, 0.5, 0.0]).unwrap();
        assert_eq!(d.min, 0.0);
        assert_eq!(d.max, 1.0);
        assert_eq!(d.mean, 0.5);
        assert_eq!(d.unique_count, 3);
    }

    #[test]
    fn signed_zeros_count_as_one_score() {
        let d = ScoreDistribution::from_scores(&[0.0, -0.0, 0.0]).unwrap();
        assert_eq!(d.unique_count, 1);
    }

    #[test]
    fn no_scores_no_distribution() {
        assert!(ScoreDistribution::from_scores(&[]).is_none());
    }

    #[test]
    fn rejected_report_renders_reason() {
        let report = ValidationReport::rejected("broken", "plugin crashed");
        assert_eq!(report.to_string(), "metric 'broken' rejected: plugin crashed");
    }
}
