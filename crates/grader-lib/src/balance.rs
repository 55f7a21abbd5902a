//! Synthetic minority oversampling for the training fold
//!
//! New samples are interpolated between a real sample and one of its k
//! nearest same-class neighbours. Classes with a single member cannot be
//! interpolated and are duplicated instead. The random source is supplied
//! by the caller so resampling is reproducible.

use crate::error::{GradeError, PipelineWarning, Result};
use crate::models::{class_counts, PerformanceCategory};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default number of neighbours considered for interpolation
pub const DEFAULT_K_NEIGHBORS: usize = 5;

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Neighbours considered per sample
    pub k_neighbors: usize,
    /// Count every class is brought to (default: the majority count)
    pub target_count: Option<usize>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            k_neighbors: DEFAULT_K_NEIGHBORS,
            target_count: None,
        }
    }
}

/// Counts before and after resampling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceReport {
    pub before: BTreeMap<PerformanceCategory, usize>,
    pub after: BTreeMap<PerformanceCategory, usize>,
    pub synthesized: BTreeMap<PerformanceCategory, usize>,
    pub warnings: Vec<PipelineWarning>,
}

impl BalanceReport {
    pub fn total_synthesized(&self) -> usize {
        self.synthesized.values().sum()
    }
}

/// Training fold after resampling
///
/// The original samples keep their positions; new samples are appended.
#[derive(Debug, Clone)]
pub struct BalancedSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<PerformanceCategory>,
    pub report: BalanceReport,
}

pub struct SmoteBalancer {
    config: BalancerConfig,
}

impl SmoteBalancer {
    pub fn new(config: BalancerConfig) -> Result<Self> {
        if config.k_neighbors == 0 {
            return Err(GradeError::Configuration(
                "k_neighbors must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn balance<R: Rng + ?Sized>(
        &self,
        features: &[Vec<f64>],
        labels: &[PerformanceCategory],
        rng: &mut R,
    ) -> Result<BalancedSet> {
        if features.len() != labels.len() {
            return Err(GradeError::DataIntegrity(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }

        let before = class_counts(labels.iter().copied());
        let majority = before.values().copied().max().unwrap_or(0);
        let target = match self.config.target_count {
            Some(t) if t < majority => {
                return Err(GradeError::Configuration(format!(
                    "balance target {} is below the majority class count {}",
                    t, majority
                )));
            }
            Some(t) => t,
            None => majority,
        };

        let mut out_features = features.to_vec();
        let mut out_labels = labels.to_vec();
        let mut synthesized = BTreeMap::new();
        let mut warnings = Vec::new();

        for (&class, &count) in &before {
            let needed = target - count;
            if needed == 0 {
                continue;
            }
            let members: Vec<&[f64]> = features
                .iter()
                .zip(labels)
                .filter(|(_, l)| **l == class)
                .map(|(f, _)| f.as_slice())
                .collect();

            if members.len() < 2 {
                warn!(
                    class = %class,
                    members = members.len(),
                    duplicated = needed,
                    "Class too small to interpolate, duplicating samples"
                );
                warnings.push(PipelineWarning::ClassImbalance {
                    class,
                    members: members.len(),
                    duplicated: needed,
                });
                for _ in 0..needed {
                    out_features.push(members[0].to_vec());
                    out_labels.push(class);
                }
            } else {
                let k = self.config.k_neighbors.min(members.len() - 1);
                let neighbors = nearest_neighbors(&members, k);
                for _ in 0..needed {
                    let base = rng.gen_range(0..members.len());
                    let nn = neighbors[base][rng.gen_range(0..k)];
                    let gap: f64 = rng.gen();
                    let sample = members[base]
                        .iter()
                        .zip(members[nn])
                        .map(|(a, b)| a + gap * (b - a))
                        .collect();
                    out_features.push(sample);
                    out_labels.push(class);
                }
                debug!(class = %class, k, synthesized = needed, "Synthesized minority samples");
            }
            synthesized.insert(class, needed);
        }

        let after = class_counts(out_labels.iter().copied());
        Ok(BalancedSet {
            features: out_features,
            labels: out_labels,
            report: BalanceReport {
                before,
                after,
                synthesized,
                warnings,
            },
        })
    }
}

/// k nearest neighbours of every member (excluding itself), by Euclidean
/// distance with ties broken by member order
fn nearest_neighbors(members: &[&[f64]], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut dists: Vec<(f64, usize)> = members
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, b)| (squared_distance(a, b), j))
                .collect();
            dists.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            dists.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
