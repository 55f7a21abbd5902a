//! Atomic on-disk persistence of model releases
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                      version id of the published release
//! releases/<version>/
//!   classifier.json
//!   scaler.json
//!   features.json
//!   evaluation.json            optional, not part of the versioned unit
//! ```
//!
//! A release is written into a private staging directory which is renamed
//! into `releases/` only once complete. `CURRENT` is then replaced via
//! write-to-temporary and rename, so readers see either the old or the new
//! release and never a partial one.

use super::bundle::{is_valid_version, short_version, ModelArtifact};
use crate::error::{GradeError, Result};
use crate::forest::RandomForest;
use crate::observability::StructuredLogger;
use crate::preprocess::{FeatureSchema, StandardScaler};
use crate::training::EvaluationReport;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const CURRENT_FILE: &str = "CURRENT";
pub const RELEASES_DIR: &str = "releases";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURES_FILE: &str = "features.json";
pub const EVALUATION_FILE: &str = "evaluation.json";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize, Deserialize)]
struct ClassifierFile {
    version: String,
    classifier: RandomForest,
}

#[derive(Serialize, Deserialize)]
struct ScalerFile {
    version: String,
    scaler: StandardScaler,
}

#[derive(Serialize, Deserialize)]
struct FeaturesFile {
    version: String,
    features: FeatureSchema,
}

#[derive(Serialize, Deserialize)]
struct EvaluationFile {
    version: String,
    report: EvaluationReport,
}

/// A release directory found under `releases/`
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub path: PathBuf,
    pub published_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

/// Removes the staging directory unless the release was committed
struct StagingDir {
    path: PathBuf,
    committed: bool,
}

impl StagingDir {
    fn create(root: &Path, version: &str) -> Result<Self> {
        let name = format!(
            ".staging-{}-{}-{}",
            short_version(version),
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = root.join(name);
        fs::create_dir_all(&path).map_err(|e| GradeError::io(&path, e))?;
        Ok(Self {
            path,
            committed: false,
        })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// Versioned model releases rooted at one directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.root.join(RELEASES_DIR).join(version)
    }

    /// Publish an artifact and make it current
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        self.save_with_report(artifact, None)
    }

    /// Publish an artifact together with its evaluation report
    pub fn save_with_report(
        &self,
        artifact: &ModelArtifact,
        report: Option<&EvaluationReport>,
    ) -> Result<PathBuf> {
        let version = artifact.version();
        let releases = self.root.join(RELEASES_DIR);
        fs::create_dir_all(&releases).map_err(|e| GradeError::io(&releases, e))?;

        let target = self.release_dir(version);
        let reuse = target.is_dir() && self.release_is_intact(version, &target)?;
        if reuse {
            // Identical content hashes to the same version; only the report can differ
            debug!(version = %short_version(version), "Release already present, reusing it");
            if let Some(report) = report {
                let file = EvaluationFile {
                    version: version.to_string(),
                    report: report.clone(),
                };
                write_atomic(&target.join(EVALUATION_FILE), &serde_json::to_vec_pretty(&file)?)?;
            }
        } else {
            let mut staging = StagingDir::create(&self.root, version)?;
            write_release_files(&staging.path, artifact, report)?;
            match fs::rename(&staging.path, &target) {
                Ok(()) => staging.committed = true,
                // Another writer published the same content first
                Err(_) if target.is_dir() && self.load_release(version).is_ok() => {}
                Err(e) => return Err(GradeError::io(&target, e)),
            }
        }

        let previous = self.current_version()?;
        write_atomic(&self.root.join(CURRENT_FILE), format!("{}\n", version).as_bytes())?;

        StructuredLogger::new("artifact_store").log_artifact_published(
            version,
            &target.display().to_string(),
            previous.as_deref(),
        );
        Ok(target)
    }

    /// Version named by `CURRENT`, if any release was published
    pub fn current_version(&self) -> Result<Option<String>> {
        let path = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let version = text.trim();
                if version.is_empty() {
                    Err(GradeError::ArtifactCorruption(format!(
                        "{} is empty",
                        path.display()
                    )))
                } else if !is_valid_version(version) {
                    Err(GradeError::ArtifactCorruption(format!(
                        "{} does not name a release: {:?}",
                        path.display(),
                        version
                    )))
                } else {
                    Ok(Some(version.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GradeError::io(&path, e)),
        }
    }

    /// Load the current release
    pub fn load(&self) -> Result<ModelArtifact> {
        let version = self.current_version()?.ok_or_else(|| {
            GradeError::ArtifactCorruption(format!(
                "no published release under {}",
                self.root.display()
            ))
        })?;
        self.load_release(&version)
    }

    /// Load a specific release by version
    pub fn load_release(&self, version: &str) -> Result<ModelArtifact> {
        if !is_valid_version(version) {
            return Err(GradeError::ArtifactCorruption(format!(
                "invalid release version {:?}",
                version
            )));
        }
        let dir = self.release_dir(version);
        if !dir.is_dir() {
            return Err(GradeError::ArtifactCorruption(format!(
                "release directory {} is missing",
                dir.display()
            )));
        }

        let classifier: ClassifierFile = read_part(&dir.join(CLASSIFIER_FILE))?;
        let scaler: ScalerFile = read_part(&dir.join(SCALER_FILE))?;
        let features: FeaturesFile = read_part(&dir.join(FEATURES_FILE))?;

        for (name, recorded) in [
            (CLASSIFIER_FILE, &classifier.version),
            (SCALER_FILE, &scaler.version),
            (FEATURES_FILE, &features.version),
        ] {
            if recorded != version {
                return Err(GradeError::ArtifactCorruption(format!(
                    "{} belongs to release {}, expected {}",
                    name,
                    short_version(recorded),
                    short_version(version)
                )));
            }
        }

        let artifact = ModelArtifact::from_parts(
            version.to_string(),
            classifier.classifier,
            scaler.scaler,
            features.features,
        )?;
        debug!(version = %artifact.short_version(), features = artifact.n_features(), "Model release loaded");
        Ok(artifact)
    }

    /// Evaluation report stored with a release, if any
    pub fn load_report(&self, version: &str) -> Result<Option<EvaluationReport>> {
        if !is_valid_version(version) {
            return Err(GradeError::ArtifactCorruption(format!(
                "invalid release version {:?}",
                version
            )));
        }
        let path = self.release_dir(version).join(EVALUATION_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let file: EvaluationFile = read_part(&path)?;
        Ok(Some(file.report))
    }

    /// Published releases, newest first
    pub fn releases(&self) -> Result<Vec<ReleaseInfo>> {
        let dir = self.root.join(RELEASES_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let current = self.current_version()?;

        let mut releases = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| GradeError::io(&dir, e))? {
            let entry = entry.map_err(|e| GradeError::io(&dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let version = entry.file_name().to_string_lossy().into_owned();
            if !is_valid_version(&version) {
                continue;
            }
            let published_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            releases.push(ReleaseInfo {
                is_current: current.as_deref() == Some(version.as_str()),
                version,
                path,
                published_at,
            });
        }
        releases.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(releases)
    }

    /// Delete old releases, keeping the current one plus the `keep` most
    /// recent others. Returns the removed versions.
    pub fn prune_releases(&self, keep: usize) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        let mut kept = 0;
        for release in self.releases()? {
            if release.is_current {
                continue;
            }
            if kept < keep {
                kept += 1;
                continue;
            }
            fs::remove_dir_all(&release.path).map_err(|e| GradeError::io(&release.path, e))?;
            removed.push(release.version);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), kept, "Pruned old model releases");
        }
        Ok(removed)
    }

    /// Check an existing release directory; a damaged one is moved aside and
    /// deleted so the caller can publish a fresh copy in its place
    fn release_is_intact(&self, version: &str, dir: &Path) -> Result<bool> {
        let err = match self.load_release(version) {
            Ok(_) => return Ok(true),
            Err(e) => e,
        };
        warn!(
            version = %short_version(version),
            error = %err,
            "Existing release is damaged, replacing it"
        );

        let aside = self.root.join(format!(
            ".damaged-{}-{}-{}",
            short_version(version),
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        match fs::rename(dir, &aside) {
            Ok(()) => {
                if let Err(e) = fs::remove_dir_all(&aside) {
                    warn!(path = %aside.display(), error = %e, "Failed to remove damaged release");
                }
            }
            // Already moved by a concurrent writer
            Err(_) if !dir.exists() => {}
            Err(e) => return Err(GradeError::io(dir, e)),
        }
        Ok(false)
    }
}

fn write_release_files(
    dir: &Path,
    artifact: &ModelArtifact,
    report: Option<&EvaluationReport>,
) -> Result<()> {
    let version = artifact.version().to_string();
    write_file(
        &dir.join(CLASSIFIER_FILE),
        &serde_json::to_vec(&ClassifierFile {
            version: version.clone(),
            classifier: artifact.classifier().clone(),
        })?,
    )?;
    write_file(
        &dir.join(SCALER_FILE),
        &serde_json::to_vec_pretty(&ScalerFile {
            version: version.clone(),
            scaler: artifact.scaler().clone(),
        })?,
    )?;
    write_file(
        &dir.join(FEATURES_FILE),
        &serde_json::to_vec_pretty(&FeaturesFile {
            version: version.clone(),
            features: artifact.schema().clone(),
        })?,
    )?;
    if let Some(report) = report {
        write_file(
            &dir.join(EVALUATION_FILE),
            &serde_json::to_vec_pretty(&EvaluationFile {
                version,
                report: report.clone(),
            })?,
        )?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| GradeError::io(path, e))?;
    file.write_all(bytes).map_err(|e| GradeError::io(path, e))?;
    file.sync_all().map_err(|e| GradeError::io(path, e))?;
    Ok(())
}

/// Replace `path` via a sibling temporary file and rename
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        file_name,
        std::process::id(),
        STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = write_file(&temp_path, bytes)
        .and_then(|_| fs::rename(&temp_path, path).map_err(|e| GradeError::io(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn read_part<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GradeError::ArtifactCorruption(format!("{} is missing", path.display()))
        } else {
            GradeError::io(path, e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        GradeError::ArtifactCorruption(format!("{} is unparsable: {}", path.display(), e))
    })
}
