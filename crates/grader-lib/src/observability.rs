//! Observability infrastructure for the grading pipeline
//!
//! Provides:
//! - Prometheus metrics (training duration, inference latency, predictions by label, model version)
//! - Structured logging of pipeline events with tracing

use crate::error::PipelineWarning;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Histogram buckets for training duration (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    training_duration_seconds: Histogram,
    inference_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    inference_errors: IntCounter,
    synthetic_samples: IntCounter,
    model_version_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "sitegrade_training_duration_seconds",
                "Wall time of a complete training run",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            inference_latency_seconds: register_histogram!(
                "sitegrade_inference_latency_seconds",
                "Time spent scoring one record",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "sitegrade_predictions_total",
                "Predictions served, by predicted label",
                &["label"]
            )
            .expect("Failed to register predictions_total"),

            inference_errors: register_int_counter!(
                "sitegrade_inference_errors_total",
                "Records rejected by the inference engine"
            )
            .expect("Failed to register inference_errors"),

            synthetic_samples: register_int_counter!(
                "sitegrade_synthetic_samples_total",
                "Training samples synthesized by the class balancer"
            )
            .expect("Failed to register synthetic_samples"),

            model_version_info: register_gauge_vec!(
                "sitegrade_model_version_info",
                "Currently loaded model release",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same collectors.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, label: &str) {
        self.inner().predictions_total.with_label_values(&[label]).inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors.inc();
    }

    pub fn add_synthetic_samples(&self, count: usize) {
        self.inner().synthetic_samples.inc_by(count as u64);
    }

    /// Mark `version` as the loaded model, clearing any previous one
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }

    /// Text exposition of every registered collector
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Structured logger for pipeline events
///
/// Emits one event per significant pipeline step with a stable `event`
/// field so that JSON logs can be filtered by step.
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_dataset_generated(&self, path: &str, rows: usize, mode: &str, seed: u64) {
        info!(
            event = "dataset_generated",
            component = %self.component,
            path = %path,
            rows = rows,
            mode = %mode,
            seed = seed,
            "Dataset generated"
        );
    }

    pub fn log_training_completed(
        &self,
        version: &str,
        accuracy: f64,
        train_rows: usize,
        held_out: usize,
        synthesized: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "training_completed",
            component = %self.component,
            model_version = %version,
            accuracy = accuracy,
            train_rows = train_rows,
            held_out = held_out,
            synthesized = synthesized,
            duration_secs = duration_secs,
            "Training completed"
        );
    }

    pub fn log_artifact_published(&self, version: &str, path: &str, previous: Option<&str>) {
        info!(
            event = "artifact_published",
            component = %self.component,
            model_version = %version,
            path = %path,
            previous_version = ?previous,
            "Model artifact published"
        );
    }

    pub fn log_prediction(&self, label: &str, confidence: f64, model_version: &str, missing: usize) {
        info!(
            event = "prediction_made",
            component = %self.component,
            label = %label,
            confidence = confidence,
            model_version = %model_version,
            missing_features = missing,
            "Record graded"
        );
    }

    pub fn log_warning(&self, warning: &PipelineWarning) {
        warn!(
            event = "pipeline_warning",
            component = %self.component,
            warning = %warning,
            "Recoverable pipeline condition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_render() {
        let metrics = PipelineMetrics::new();
        metrics.observe_training_duration(1.5);
        metrics.observe_inference_latency(0.0002);
        metrics.inc_predictions("Good");
        metrics.add_synthetic_samples(3);
        metrics.set_model_version("abc123");

        let text = metrics.render();
        assert!(text.contains("sitegrade_predictions_total"));
        assert!(text.contains("sitegrade_model_version_info"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("trainer");
        assert_eq!(logger.component, "trainer");
    }
}
