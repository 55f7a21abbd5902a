//! Inference engine

mod inference;
mod output;

pub use inference::{predict, predict_with_threshold, InferenceEngine, InferenceStats};
pub use output::{Prediction, DEFAULT_LOW_CONFIDENCE_THRESHOLD};

use crate::error::Result;
use crate::models::MetricRecord;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Grade a record
    fn predict(&self, record: &MetricRecord) -> Result<Prediction>;

    /// Version of the model answering predictions
    fn model_version(&self) -> &str;
}
