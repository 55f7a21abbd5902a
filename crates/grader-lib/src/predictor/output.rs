//! Prediction output and confidence reporting

use crate::models::{Feature, PerformanceCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence below which a prediction carries a reason string
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Graded verdict for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: PerformanceCategory,
    /// Probability of `label`
    pub confidence: f64,
    /// One entry per class known to the model, summing to 1
    pub probabilities: BTreeMap<PerformanceCategory, f64>,
    pub model_version: String,
    /// Schema features the record did not carry (scored as 0)
    pub missing_features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_confidence_reason: Option<String>,
}

impl Prediction {
    pub(crate) fn new(
        classes: &[PerformanceCategory],
        probabilities: &[f64],
        best: usize,
        model_version: &str,
        missing: &[Feature],
        threshold: f64,
    ) -> Self {
        let confidence = probabilities[best];
        Self {
            label: classes[best],
            confidence,
            probabilities: classes.iter().copied().zip(probabilities.iter().copied()).collect(),
            model_version: model_version.to_string(),
            missing_features: missing.iter().map(|f| f.as_str().to_string()).collect(),
            low_confidence_reason: low_confidence_reason(confidence, missing.len(), threshold),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence_reason.is_some()
    }

    /// Probabilities ordered from most to least likely
    pub fn ranked(&self) -> Vec<(PerformanceCategory, f64)> {
        let mut ranked: Vec<_> = self.probabilities.iter().map(|(c, p)| (*c, *p)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

fn low_confidence_reason(confidence: f64, missing: usize, threshold: f64) -> Option<String> {
    if confidence >= threshold {
        None
    } else if missing > 0 {
        Some(format!(
            "{} feature(s) missing and scored as 0; confidence {:.2} is below {:.2}",
            missing, confidence, threshold
        ))
    } else {
        Some(format!(
            "metrics fall between categories; confidence {:.2} is below {:.2}",
            confidence, threshold
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PerformanceCategory::*;

    #[test]
    fn test_low_confidence_reason() {
        assert!(low_confidence_reason(0.8, 0, 0.5).is_none());
        assert!(low_confidence_reason(0.4, 0, 0.5).unwrap().contains("between categories"));
        assert!(low_confidence_reason(0.4, 2, 0.5).unwrap().contains("2 feature(s) missing"));
    }

    #[test]
    fn test_prediction_ranking() {
        let prediction = Prediction::new(
            &[Excellent, Good, Poor],
            &[0.2, 0.7, 0.1],
            1,
            "abc",
            &[Feature::SeoScore],
            DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        );
        assert_eq!(prediction.label, Good);
        assert_eq!(prediction.confidence, 0.7);
        assert!(!prediction.is_low_confidence());
        assert_eq!(prediction.missing_features, vec!["seo_score"]);
        let ranked = prediction.ranked();
        assert_eq!(ranked[0].0, Good);
        assert_eq!(ranked[2].0, Poor);
    }
}
