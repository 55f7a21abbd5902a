//! Per-feature standardization
//!
//! Statistics are fitted on the training fold only and then applied
//! unchanged to the held-out fold and to inference inputs.

use crate::error::{GradeError, Result};
use serde::{Deserialize, Serialize};

/// Standard deviations below this are treated as zero variance
const ZERO_VARIANCE_EPSILON: f64 = 1e-12;

/// Fitted mean/std per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    /// Population std; 1.0 for constant features
    std: Vec<f64>,
    constant: Vec<bool>,
}

impl StandardScaler {
    /// Fit statistics from the rows of a training fold
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows.first().ok_or_else(|| {
            GradeError::DataIntegrity("cannot fit scaler on an empty training fold".to_string())
        })?;
        let dim = first.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
            return Err(GradeError::DataIntegrity(format!(
                "row {} has {} features, expected {}",
                bad,
                rows[bad].len(),
                dim
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; dim];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }

        let mut std = Vec::with_capacity(dim);
        let mut constant = Vec::with_capacity(dim);
        for acc in var {
            let s = (acc / n).sqrt();
            if s < ZERO_VARIANCE_EPSILON {
                std.push(1.0);
                constant.push(true);
            } else {
                std.push(s);
                constant.push(false);
            }
        }

        Ok(Self { mean, std, constant })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    /// Indices of features that had zero variance at fit time
    pub fn constant_features(&self) -> Vec<usize> {
        self.constant
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.then_some(i))
            .collect()
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.dim() {
            return Err(GradeError::DataIntegrity(format!(
                "vector has {} features, scaler expects {}",
                x.len(),
                self.dim()
            )));
        }
        Ok(x
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Structural consistency check used when loading persisted statistics
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.std.len() != self.mean.len() || self.constant.len() != self.mean.len() {
            return Err(format!(
                "scaler statistics disagree: {} means, {} stds, {} flags",
                self.mean.len(),
                self.std.len(),
                self.constant.len()
            ));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scaler contains a non-positive standard deviation".to_string());
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("scaler contains a non-finite mean".to_string());
        }
        Ok(())
    }
}
