//! Scoring records against a loaded model release

use super::output::{Prediction, DEFAULT_LOW_CONFIDENCE_THRESHOLD};
use super::Predictor;
use crate::artifact::ModelArtifact;
use crate::error::{GradeError, Result};
use crate::forest::argmax;
use crate::models::MetricRecord;
use crate::observability::{PipelineMetrics, StructuredLogger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Grade one record. Pure: nothing is persisted or cached.
///
/// Missing fields are encoded as 0 and reported on the prediction;
/// non-finite values are refused.
pub fn predict(record: &MetricRecord, artifact: &ModelArtifact) -> Result<Prediction> {
    predict_with_threshold(record, artifact, DEFAULT_LOW_CONFIDENCE_THRESHOLD)
}

pub fn predict_with_threshold(
    record: &MetricRecord,
    artifact: &ModelArtifact,
    low_confidence_threshold: f64,
) -> Result<Prediction> {
    let schema = artifact.schema();
    let vector = schema.encode(record);
    if let Some((feature, value)) = schema
        .features()
        .iter()
        .zip(&vector)
        .find(|(_, v)| !v.is_finite())
    {
        return Err(GradeError::DataIntegrity(format!(
            "{} has non-finite value {}",
            feature, value
        )));
    }

    let scaled = artifact.scaler().transform(&vector)?;
    let probabilities = artifact.classifier().predict_proba(&scaled)?;
    let best = argmax(&probabilities);
    let missing = schema.missing_features(record);

    Ok(Prediction::new(
        artifact.classifier().classes(),
        &probabilities,
        best,
        artifact.version(),
        &missing,
        low_confidence_threshold,
    ))
}

/// Shared-artifact inference with metrics and structured logging
///
/// Cheap to clone; every clone scores against the same immutable release,
/// so concurrent callers need no locking.
#[derive(Clone)]
pub struct InferenceEngine {
    artifact: Arc<ModelArtifact>,
    low_confidence_threshold: f64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
    stats: Arc<EngineCounters>,
}

#[derive(Default)]
struct EngineCounters {
    predictions: AtomicU64,
    rejected: AtomicU64,
}

/// Inference counters since the engine was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_predictions: u64,
    pub rejected: u64,
}

impl InferenceEngine {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        let metrics = PipelineMetrics::new();
        metrics.set_model_version(artifact.version());
        Self {
            artifact,
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            metrics,
            logger: StructuredLogger::new("inference"),
            stats: Arc::new(EngineCounters::default()),
        }
    }

    pub fn with_low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.low_confidence_threshold = threshold;
        self
    }

    pub fn artifact(&self) -> &Arc<ModelArtifact> {
        &self.artifact
    }

    /// Grade the flat metrics mapping handed over by the measurement layer
    pub fn predict_metrics(&self, metrics: &HashMap<String, f64>) -> Result<Prediction> {
        let record = MetricRecord::from_metrics(metrics).inspect_err(|_| self.record_rejection())?;
        self.predict_record(&record)
    }

    pub fn predict_record(&self, record: &MetricRecord) -> Result<Prediction> {
        let started = Instant::now();
        let prediction = predict_with_threshold(record, &self.artifact, self.low_confidence_threshold)
            .inspect_err(|e| {
                debug!(error = %e, "Record rejected");
                self.record_rejection();
            })?;

        self.metrics
            .observe_inference_latency(started.elapsed().as_secs_f64());
        self.metrics.inc_predictions(prediction.label.as_str());
        self.stats.predictions.fetch_add(1, Ordering::Relaxed);
        self.logger.log_prediction(
            prediction.label.as_str(),
            prediction.confidence,
            self.artifact.short_version(),
            prediction.missing_features.len(),
        );
        Ok(prediction)
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_predictions: self.stats.predictions.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    fn record_rejection(&self) {
        self.metrics.inc_inference_errors();
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
    }
}

impl Predictor for InferenceEngine {
    fn predict(&self, record: &MetricRecord) -> Result<Prediction> {
        self.predict_record(record)
    }

    fn model_version(&self) -> &str {
        self.artifact.version()
    }
}
