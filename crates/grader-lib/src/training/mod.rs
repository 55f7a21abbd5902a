//! Classifier training and evaluation

mod evaluation;
mod trainer;

pub use evaluation::{AveragedMetrics, ClassMetrics, EvaluationReport, RankedFeature};
pub use trainer::{Trainer, TrainerConfig, TrainingOutcome};
