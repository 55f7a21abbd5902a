//! The three-part model bundle and its content-derived version

use crate::error::{GradeError, Result};
use crate::forest::RandomForest;
use crate::preprocess::{FeatureSchema, StandardScaler};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Classifier, scaling statistics and feature order of one training run
///
/// Immutable once built; share it across threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    version: String,
    classifier: RandomForest,
    scaler: StandardScaler,
    schema: FeatureSchema,
}

impl ModelArtifact {
    /// Bundle the parts, checking that their dimensions agree
    pub fn new(classifier: RandomForest, scaler: StandardScaler, schema: FeatureSchema) -> Result<Self> {
        check_shapes(&classifier, &scaler, &schema).map_err(GradeError::ArtifactCorruption)?;
        let version = content_version(&classifier, &scaler, &schema)?;
        Ok(Self {
            version,
            classifier,
            scaler,
            schema,
        })
    }

    /// Rebuild a bundle read from disk, verifying the recorded version
    pub(crate) fn from_parts(
        version: String,
        classifier: RandomForest,
        scaler: StandardScaler,
        schema: FeatureSchema,
    ) -> Result<Self> {
        check_shapes(&classifier, &scaler, &schema).map_err(GradeError::ArtifactCorruption)?;
        classifier
            .validate()
            .map_err(|e| GradeError::ArtifactCorruption(format!("classifier: {}", e)))?;
        scaler
            .validate()
            .map_err(|e| GradeError::ArtifactCorruption(format!("scaler: {}", e)))?;

        let expected = content_version(&classifier, &scaler, &schema)?;
        if expected != version {
            return Err(GradeError::ArtifactCorruption(format!(
                "content hash {} does not match recorded version {}",
                short_version(&expected),
                short_version(&version)
            )));
        }
        Ok(Self {
            version,
            classifier,
            scaler,
            schema,
        })
    }

    /// SHA-256 (hex) over the canonical JSON of the three parts
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn short_version(&self) -> &str {
        short_version(&self.version)
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }
}

/// Whether `version` has the shape of a content hash: 64 lowercase hex digits
pub fn is_valid_version(version: &str) -> bool {
    version.len() == 64 && version.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// First 12 hex digits, for display
pub fn short_version(version: &str) -> &str {
    version.get(..12).unwrap_or(version)
}

fn check_shapes(
    classifier: &RandomForest,
    scaler: &StandardScaler,
    schema: &FeatureSchema,
) -> std::result::Result<(), String> {
    if classifier.n_features() != schema.len() || scaler.dim() != schema.len() {
        return Err(format!(
            "dimension mismatch: {} features listed, scaler has {}, classifier expects {}",
            schema.len(),
            scaler.dim(),
            classifier.n_features()
        ));
    }
    Ok(())
}

fn content_version(
    classifier: &RandomForest,
    scaler: &StandardScaler,
    schema: &FeatureSchema,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_part(&mut hasher, "classifier", classifier)?;
    hash_part(&mut hasher, "scaler", scaler)?;
    hash_part(&mut hasher, "features", schema)?;
    Ok(hex::encode(hasher.finalize()))
}

fn hash_part<T: Serialize>(hasher: &mut Sha256, name: &str, part: &T) -> Result<()> {
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(part)?);
    hasher.update([0u8]);
    Ok(())
}
