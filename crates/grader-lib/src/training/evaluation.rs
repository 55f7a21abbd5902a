//! Held-out evaluation of a trained classifier

use crate::models::{Feature, PerformanceCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Precision/recall/F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Averages over classes; `weighted` uses support as weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub feature: String,
    pub importance: f64,
}

/// Evaluation summary stored next to every release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// Rows in the held-out fold
    pub held_out: usize,
    pub per_class: BTreeMap<PerformanceCategory, ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    /// Row and column order of the confusion matrix
    pub classes: Vec<PerformanceCategory>,
    /// `confusion[actual][predicted]`
    pub confusion: Vec<Vec<usize>>,
    /// Descending by importance, summing to 1
    pub feature_importance: Vec<RankedFeature>,
    /// Class counts of the training fold after balancing
    pub training_distribution: BTreeMap<PerformanceCategory, usize>,
    pub generated_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// Score predictions against the held-out labels
    pub fn compute(
        classes: &[PerformanceCategory],
        actual: &[PerformanceCategory],
        predicted: &[PerformanceCategory],
        feature_order: &[Feature],
        importances: &[f64],
        training_distribution: BTreeMap<PerformanceCategory, usize>,
    ) -> Self {
        let index = |c: &PerformanceCategory| classes.iter().position(|k| k == c);
        let mut confusion = vec![vec![0usize; classes.len()]; classes.len()];
        let mut correct = 0;
        for (a, p) in actual.iter().zip(predicted) {
            if a == p {
                correct += 1;
            }
            if let (Some(i), Some(j)) = (index(a), index(p)) {
                confusion[i][j] += 1;
            }
        }

        let mut per_class = BTreeMap::new();
        for (i, class) in classes.iter().enumerate() {
            let tp = confusion[i][i] as f64;
            let support: usize = confusion[i].iter().sum();
            let predicted_count: usize = confusion.iter().map(|row| row[i]).sum();
            let precision = ratio(tp, predicted_count as f64);
            let recall = ratio(tp, support as f64);
            let f1 = ratio(2.0 * precision * recall, precision + recall);
            per_class.insert(
                *class,
                ClassMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                },
            );
        }

        let n_classes = per_class.len().max(1) as f64;
        let total_support: usize = per_class.values().map(|m| m.support).sum();
        let macro_avg = AveragedMetrics {
            precision: per_class.values().map(|m| m.precision).sum::<f64>() / n_classes,
            recall: per_class.values().map(|m| m.recall).sum::<f64>() / n_classes,
            f1: per_class.values().map(|m| m.f1).sum::<f64>() / n_classes,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            ratio(
                per_class.values().map(|m| f(m) * m.support as f64).sum(),
                total_support as f64,
            )
        };
        let weighted_avg = AveragedMetrics {
            precision: weighted(|m: &ClassMetrics| m.precision),
            recall: weighted(|m: &ClassMetrics| m.recall),
            f1: weighted(|m: &ClassMetrics| m.f1),
        };

        let mut feature_importance: Vec<RankedFeature> = feature_order
            .iter()
            .zip(importances)
            .map(|(f, v)| RankedFeature {
                feature: f.as_str().to_string(),
                importance: *v,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        Self {
            accuracy: ratio(correct as f64, actual.len() as f64),
            held_out: actual.len(),
            per_class,
            macro_avg,
            weighted_avg,
            classes: classes.to_vec(),
            confusion,
            feature_importance,
            training_distribution,
            generated_at: Utc::now(),
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PerformanceCategory::*;

    #[test]
    fn test_metrics_from_known_confusion() {
        let classes = [Excellent, Poor];
        let actual = [Poor, Poor, Poor, Excellent];
        let predicted = [Poor, Poor, Excellent, Excellent];
        let report = EvaluationReport::compute(
            &classes,
            &actual,
            &predicted,
            &[Feature::SeoScore, Feature::FirstContentfulPaint],
            &[0.25, 0.75],
            BTreeMap::new(),
        );

        assert!((report.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(report.confusion, vec![vec![1, 0], vec![1, 2]]);

        let poor = &report.per_class[&Poor];
        assert!((poor.precision - 1.0).abs() < 1e-12);
        assert!((poor.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(poor.support, 3);

        let excellent = &report.per_class[&Excellent];
        assert!((excellent.precision - 0.5).abs() < 1e-12);
        assert!((excellent.recall - 1.0).abs() < 1e-12);

        assert!((report.macro_avg.recall - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-12);
        assert_eq!(report.feature_importance[0].feature, "first_contentful_paint");
    }

    #[test]
    fn test_empty_fold_scores_zero() {
        let report = EvaluationReport::compute(&[Good, Poor], &[], &[], &[], &[], BTreeMap::new());
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.held_out, 0);
    }
}
