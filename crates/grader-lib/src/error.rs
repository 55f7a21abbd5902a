//! Error and warning types shared by every pipeline stage
//!
//! Fatal conditions abort the batch job (or refuse inference) and are
//! carried by [`GradeError`]. Recoverable conditions never interrupt the
//! pipeline; they are collected as [`PipelineWarning`] values and logged.

use crate::models::PerformanceCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, GradeError>;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum GradeError {
    /// Missing dataset path, invalid hyper-parameter or unreadable config
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing label column, malformed row, too few classes
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Absent, unparsable or mutually inconsistent artifact files
    #[error("artifact corruption: {0}")]
    ArtifactCorruption(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GradeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::DataIntegrity(_) => "data_integrity",
            Self::ArtifactCorruption(_) => "artifact_corruption",
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Recoverable conditions raised while fitting the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A training-fold column has zero variance; its std is treated as 1
    DegenerateFeature { feature: String },
    /// A class had too few members to interpolate; samples were duplicated
    ClassImbalance {
        class: PerformanceCategory,
        members: usize,
        duplicated: usize,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateFeature { feature } => {
                write!(f, "feature '{}' is constant in the training fold", feature)
            }
            Self::ClassImbalance {
                class,
                members,
                duplicated,
            } => write!(
                f,
                "class '{}' has {} member(s), duplicated {} sample(s) instead of synthesizing",
                class, members, duplicated
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GradeError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(GradeError::DataIntegrity("x".into()).kind(), "data_integrity");
        assert_eq!(
            GradeError::ArtifactCorruption("x".into()).kind(),
            "artifact_corruption"
        );
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = GradeError::io(
            "/tmp/missing.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.csv"));
    }

    #[test]
    fn test_warning_display() {
        let w = PipelineWarning::ClassImbalance {
            class: PerformanceCategory::Excellent,
            members: 1,
            duplicated: 4,
        };
        assert!(w.to_string().contains("Excellent"));
        assert!(w.to_string().contains("duplicated 4"));
    }
}
