use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MetricError;

use super::traits::Metric;

/// Names accepted by [`builtin_metric`].
pub const BUILTIN_METRICS: [&str; 3] = ["exact_match", "contains", "token_f1"];

/// Looks up a built-in metric by name.
pub fn builtin_metric(name: &str) -> Option<Arc<dyn Metric>> {
    match name {
        "exact_match" => Some(Arc::new(ExactMatch::default())),
        "contains" => Some(Arc::new(Contains::default())),
        "token_f1" => Some(Arc::new(TokenF1)),
        _ => None,
    }
}

/// 1.0 when the trimmed prediction equals the expected output.
#[derive(Debug, Clone, Default)]
pub struct ExactMatch {
    pub case_sensitive: bool,
}

#[async_trait]
impl Metric for ExactMatch {
    fn name(&self) -> &str {
        "exact_match"
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        let (p, e) = (predicted.trim(), expected.trim());
        let equal = if self.case_sensitive {
            p == e
        } else {
            p.to_lowercase() == e.to_lowercase()
        };
        Ok(if equal { 1.0 } else { 0.0 })
    }
}

/// 1.0 when the expected output appears anywhere in the prediction.
#[derive(Debug, Clone, Default)]
pub struct Contains {
    pub case_sensitive: bool,
}

#[async_trait]
impl Metric for Contains {
    fn name(&self) -> &str {
        "contains"
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        let expected = expected.trim();
        let found = if self.case_sensitive {
            predicted.contains(expected)
        } else {
            predicted.to_lowercase().contains(&expected.to_lowercase())
        };
        Ok(if found { 1.0 } else { 0.0 })
    }
}

/// Token-overlap F1 between prediction and expected output.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenF1;

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Metric for TokenF1 {
    fn name(&self) -> &str {
        "token_f1"
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        let predicted = tokens(predicted);
        let expected = tokens(expected);
        if predicted.is_empty() || expected.is_empty() {
            return Ok(if predicted == expected { 1.0 } else { 0.0 });
        }

        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for token in &expected {
            *remaining.entry(token.as_str()).or_default() += 1;
        }
        let mut common = 0usize;
        for token in &predicted {
            if let Some(count) = remaining.get_mut(token.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    common += 1;
                }
            }
        }
        if common == 0 {
            return Ok(0.0);
        }
        let precision = common as f32 / predicted.len() as f32;
        let recall = common as f32 / expected.len() as f32;
        Ok(2.0 * precision * recall / (precision + recall))
    }
}
