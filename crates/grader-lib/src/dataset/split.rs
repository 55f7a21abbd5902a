//! Stratified train/test split

use crate::error::{GradeError, Result};
use crate::models::PerformanceCategory;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Default fraction of every class held out for evaluation
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Row indices of the two folds, each sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices per class so both folds keep the class proportions.
///
/// Every class keeps at least one training row; a class with a single
/// member contributes nothing to the test fold.
pub fn stratified_split(
    labels: &[PerformanceCategory],
    test_fraction: f64,
    seed: u64,
) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(GradeError::Configuration(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_class: BTreeMap<PerformanceCategory, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        let n = members.len();
        let n_test = ((n as f64 * test_fraction).round() as usize).min(n.saturating_sub(1));
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(SplitIndices { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::class_counts;
    use PerformanceCategory::*;

    fn labels() -> Vec<PerformanceCategory> {
        let mut labels = vec![Poor; 50];
        labels.extend(vec![Good; 30]);
        labels.extend(vec![Excellent; 20]);
        labels
    }

    #[test]
    fn test_proportions_preserved() {
        let labels = labels();
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        let test_counts = class_counts(split.test.iter().map(|&i| labels[i]));
        assert_eq!(test_counts[&Poor], 10);
        assert_eq!(test_counts[&Good], 6);
        assert_eq!(test_counts[&Excellent], 4);
        assert_eq!(split.train.len() + split.test.len(), labels.len());
    }

    #[test]
    fn test_folds_are_disjoint_and_deterministic() {
        let labels = labels();
        let a = stratified_split(&labels, 0.25, 7).unwrap();
        let b = stratified_split(&labels, 0.25, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.test.iter().all(|i| !a.train.contains(i)));
        assert_ne!(a, stratified_split(&labels, 0.25, 8).unwrap());
    }

    #[test]
    fn test_singleton_class_stays_in_training() {
        let labels = vec![Poor, Poor, Poor, Poor, Good];
        let split = stratified_split(&labels, 0.5, 1).unwrap();
        assert!(split.train.contains(&4));
        assert!(!split.test.contains(&4));
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(stratified_split(&labels(), 0.0, 1).is_err());
        assert!(stratified_split(&labels(), 1.0, 1).is_err());
        assert!(stratified_split(&labels(), f64::NAN, 1).is_err());
    }
}
