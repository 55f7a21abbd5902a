//! Process-wide reuse of a loaded release

use super::bundle::ModelArtifact;
use super::store::ArtifactStore;
use crate::error::{GradeError, Result};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Keeps the most recently loaded release, keyed by the published version.
///
/// Each `get` re-reads `CURRENT`; the release files are only parsed again
/// when the pointer names a different version.
pub struct ArtifactCache {
    store: ArtifactStore,
    loaded: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ArtifactCache {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            loaded: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn get(&self) -> Result<Arc<ModelArtifact>> {
        let version = self.store.current_version()?.ok_or_else(|| {
            GradeError::ArtifactCorruption(format!(
                "no published release under {}",
                self.store.root().display()
            ))
        })?;

        if let Some(cached) = self.cached() {
            if cached.version() == version {
                return Ok(cached);
            }
        }

        let artifact = Arc::new(self.store.load_release(&version)?);
        let mut slot = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::clone(&artifact));
        info!(version = %artifact.short_version(), "Model release cached");
        Ok(artifact)
    }

    /// Currently cached release, without touching the filesystem
    pub fn cached(&self) -> Option<Arc<ModelArtifact>> {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        *self.loaded.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
