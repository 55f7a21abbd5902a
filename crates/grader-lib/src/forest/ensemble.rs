//! Random forest classifier
//!
//! Trees are fitted independently on bootstrap samples of an immutable
//! training fold. Each tree gets its own seed drawn up front from the
//! master seed, so the result does not depend on how rayon schedules them.

use super::tree::{DecisionTree, FeatureMatrix, TreeParams};
use crate::error::{GradeError, Result};
use crate::models::PerformanceCategory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

/// Default number of trees
pub const DEFAULT_N_TREES: usize = 100;

/// Default maximum tree depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Per-class sample weighting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    #[default]
    None,
    /// Weight classes inversely to their frequency
    Balanced,
}

/// Number of features examined per split
///
/// Configured as `"sqrt"`, `"all"` or a positive count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "MaxFeaturesSetting")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    All,
    Fixed(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaxFeaturesSetting {
    Count(usize),
    Name(String),
}

impl TryFrom<MaxFeaturesSetting> for MaxFeatures {
    type Error = String;

    fn try_from(setting: MaxFeaturesSetting) -> std::result::Result<Self, String> {
        match setting {
            MaxFeaturesSetting::Count(k) => Ok(Self::Fixed(k)),
            MaxFeaturesSetting::Name(name) => name.parse(),
        }
    }
}

impl FromStr for MaxFeatures {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim() {
            "sqrt" => Ok(Self::Sqrt),
            "all" => Ok(Self::All),
            other => other
                .parse()
                .map(Self::Fixed)
                .map_err(|_| format!("max_features must be sqrt, all or a count, got '{}'", other)),
        }
    }
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::All => n_features,
            Self::Fixed(k) => *k,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Hyper-parameters for [`RandomForest::fit`]
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
    pub class_weight: ClassWeight,
    /// Threads used for tree fitting (default: rayon's global pool)
    pub n_jobs: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_N_TREES,
            max_depth: Some(DEFAULT_MAX_DEPTH),
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 42,
            class_weight: ClassWeight::None,
            n_jobs: None,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(GradeError::Configuration("n_trees must be at least 1".to_string()));
        }
        if self.max_depth == Some(0) {
            return Err(GradeError::Configuration("max_depth must be at least 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(GradeError::Configuration(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(GradeError::Configuration(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.max_features == MaxFeatures::Fixed(0) {
            return Err(GradeError::Configuration(
                "max_features must be at least 1".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(GradeError::Configuration("n_jobs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Ensemble of decision trees over a fixed class list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    /// Known classes, sorted by their text form; the index is the class id
    classes: Vec<PerformanceCategory>,
    n_features: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[PerformanceCategory], config: &ForestConfig) -> Result<Self> {
        config.validate()?;
        if x.is_empty() {
            return Err(GradeError::DataIntegrity("no training samples".to_string()));
        }
        if x.len() != y.len() {
            return Err(GradeError::DataIntegrity(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(GradeError::DataIntegrity(
                "training rows must share a non-zero feature count".to_string(),
            ));
        }

        let mut classes: Vec<PerformanceCategory> = y.to_vec();
        classes.sort_by_key(|c| c.as_str());
        classes.dedup();
        if classes.len() < 2 {
            return Err(GradeError::DataIntegrity(format!(
                "training data has {} distinct class(es), at least 2 are required",
                classes.len()
            )));
        }

        let y_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.iter().position(|c| c == label).unwrap_or(0))
            .collect();
        let class_weights = class_weights(&y_idx, classes.len(), config.class_weight);

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features.resolve(n_features),
        };

        let mut master = StdRng::seed_from_u64(config.seed);
        let seeds: Vec<u64> = (0..config.n_trees).map(|_| master.gen()).collect();
        let n_classes = classes.len();
        let matrix = FeatureMatrix::from_rows(x);

        let fit_one = |seed: &u64| {
            let mut rng = StdRng::seed_from_u64(*seed);
            let weights = sample_weights(&y_idx, &class_weights, config.bootstrap, &mut rng);
            DecisionTree::fit(&matrix, &y_idx, &weights, n_classes, &params, &mut rng)
        };

        let fitted: Vec<_> = match config.n_jobs {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| GradeError::Configuration(format!("failed to build thread pool: {}", e)))?;
                pool.install(|| seeds.par_iter().map(fit_one).collect())
            }
            None => seeds.par_iter().map(fit_one).collect(),
        };

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for tree in fitted {
            let total: f64 = tree.importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree.importances) {
                    *acc += v / total;
                }
            }
            trees.push(tree.tree);
        }
        normalize(&mut importances);

        debug!(
            trees = trees.len(),
            max_features = params.max_features,
            mean_nodes = trees.iter().map(|t| t.node_count()).sum::<usize>() / trees.len(),
            "Forest fitted"
        );
        info!(
            trees = trees.len(),
            classes = classes.len(),
            samples = x.len(),
            "Random forest trained"
        );

        Ok(Self {
            classes,
            n_features,
            trees,
            feature_importances: importances,
        })
    }

    /// Averaged leaf distributions, one probability per known class
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.n_features {
            return Err(GradeError::DataIntegrity(format!(
                "vector has {} features, classifier expects {}",
                x.len(),
                self.n_features
            )));
        }
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(x)) {
                *acc += p;
            }
        }
        normalize(&mut proba);
        Ok(proba)
    }

    /// Most probable class; ties go to the earliest class in [`Self::classes`]
    pub fn predict(&self, x: &[f64]) -> Result<PerformanceCategory> {
        let proba = self.predict_proba(x)?;
        Ok(self.classes[argmax(&proba)])
    }

    pub fn classes(&self) -> &[PerformanceCategory] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean impurity decrease per feature, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Structural check for forests read back from disk
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.classes.len() < 2 {
            return Err(format!("classifier knows {} class(es)", self.classes.len()));
        }
        if self.trees.is_empty() {
            return Err("classifier has no trees".to_string());
        }
        if self.feature_importances.len() != self.n_features {
            return Err(format!(
                "{} feature importances for {} features",
                self.feature_importances.len(),
                self.n_features
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.n_features() != self.n_features || tree.n_classes() != self.classes.len() {
                return Err(format!("tree {} disagrees with the classifier shape", i));
            }
            tree.validate().map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Index of the first maximum
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

fn class_weights(y: &[usize], n_classes: usize, mode: ClassWeight) -> Vec<f64> {
    match mode {
        ClassWeight::None => vec![1.0; n_classes],
        ClassWeight::Balanced => {
            let mut counts = vec![0usize; n_classes];
            for &c in y {
                counts[c] += 1;
            }
            counts
                .iter()
                .map(|&n| {
                    if n == 0 {
                        0.0
                    } else {
                        y.len() as f64 / (n_classes * n) as f64
                    }
                })
                .collect()
        }
    }
}

fn sample_weights(y: &[usize], class_weights: &[f64], bootstrap: bool, rng: &mut StdRng) -> Vec<f64> {
    let n = y.len();
    let mut counts = vec![0.0; n];
    if bootstrap {
        for _ in 0..n {
            counts[rng.gen_range(0..n)] += 1.0;
        }
    } else {
        counts.iter_mut().for_each(|c| *c = 1.0);
    }
    counts
        .iter()
        .zip(y)
        .map(|(c, &label)| c * class_weights[label])
        .collect()
}
