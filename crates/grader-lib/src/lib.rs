//! Web-page performance grading library
//!
//! This crate provides the core functionality for:
//! - Synthetic dataset generation and CSV persistence
//! - Feature encoding and standardization
//! - Minority oversampling of the training fold
//! - Random forest training and held-out evaluation
//! - Atomic, versioned model releases
//! - Inference against a loaded release

pub mod artifact;
pub mod balance;
pub mod config;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod preprocess;
pub mod training;

pub use artifact::{ArtifactCache, ArtifactStore, ModelArtifact};
pub use config::PipelineConfig;
pub use error::{GradeError, PipelineWarning, Result};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use predictor::{predict, InferenceEngine, Prediction, Predictor};
pub use training::{Trainer, TrainerConfig, TrainingOutcome};
