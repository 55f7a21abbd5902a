//! Tests for artifact persistence
//!
//! These tests verify:
//! - Publish/load round trips through the staging + CURRENT layout
//! - Every kind of damaged release is refused
//! - Release pruning and the version-keyed cache

use super::*;
use crate::error::GradeError;
use crate::forest::{ForestConfig, RandomForest};
use crate::models::{Feature, PerformanceCategory};
use crate::preprocess::{FeatureSchema, StandardScaler};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn small_artifact(features: &[Feature]) -> ModelArtifact {
    let x: Vec<Vec<f64>> = (0..24)
        .map(|i| features.iter().enumerate().map(|(j, _)| (i * (j + 1)) as f64).collect())
        .collect();
    let y: Vec<PerformanceCategory> = (0..24)
        .map(|i| if i < 12 { PerformanceCategory::Poor } else { PerformanceCategory::Good })
        .collect();
    let scaler = StandardScaler::fit(&x).unwrap();
    let scaled = scaler.transform_all(&x).unwrap();
    let forest = RandomForest::fit(
        &scaled,
        &y,
        &ForestConfig {
            n_trees: 5,
            ..Default::default()
        },
    )
    .unwrap();
    ModelArtifact::new(forest, scaler, FeatureSchema::new(features.to_vec()).unwrap()).unwrap()
}

fn default_artifact() -> ModelArtifact {
    small_artifact(&[Feature::FirstContentfulPaint, Feature::SeoScore])
}

fn assert_corrupt(err: GradeError) {
    assert!(
        matches!(err, GradeError::ArtifactCorruption(_)),
        "expected artifact corruption, got {}",
        err
    );
}

mod store_tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = default_artifact();

        let release = store.save(&artifact).unwrap();
        assert!(release.join(CLASSIFIER_FILE).exists());
        assert!(release.join(SCALER_FILE).exists());
        assert!(release.join(FEATURES_FILE).exists());
        assert!(!release.join(EVALUATION_FILE).exists());

        assert_eq!(store.current_version().unwrap().as_deref(), Some(artifact.version()));
        let loaded = store.load().unwrap();
        assert_eq!(loaded, artifact);

        // Nothing but CURRENT and releases/ is left at the root
        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![CURRENT_FILE, RELEASES_DIR]);
    }

    #[test]
    fn test_version_is_content_hash() {
        let a = default_artifact();
        let b = default_artifact();
        assert_eq!(a.version(), b.version());
        assert_eq!(a.version().len(), 64);
        assert_eq!(a.short_version().len(), 12);

        let other = small_artifact(&[Feature::SeoScore, Feature::FirstContentfulPaint]);
        assert_ne!(a.version(), other.version());
    }

    #[test]
    fn test_mismatched_dimensions_rejected() {
        let artifact = default_artifact();
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0, 3.0], vec![2.0, 3.0, 4.0]]).unwrap();
        let err = ModelArtifact::new(
            artifact.classifier().clone(),
            scaler,
            artifact.schema().clone(),
        )
        .unwrap_err();
        assert_corrupt(err);
    }

    #[test]
    fn test_missing_file_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let release = store.save(&default_artifact()).unwrap();

        fs::remove_file(release.join(SCALER_FILE)).unwrap();
        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_unparsable_file_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let release = store.save(&default_artifact()).unwrap();

        fs::write(release.join(FEATURES_FILE), "{\"version\": ").unwrap();
        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_parts_from_different_runs_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let first = store.save(&default_artifact()).unwrap();
        let second = store
            .save(&small_artifact(&[Feature::SeoScore, Feature::FirstContentfulPaint]))
            .unwrap();

        // Mix the scaler of one release into the other
        fs::copy(first.join(SCALER_FILE), second.join(SCALER_FILE)).unwrap();
        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_tampered_content_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let release = store.save(&default_artifact()).unwrap();

        let path = release.join(SCALER_FILE);
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["scaler"]["mean"][0] = serde_json::json!(12345.0);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_wrong_feature_count_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = default_artifact();
        let release = store.save(&artifact).unwrap();

        let path = release.join(FEATURES_FILE);
        let body = serde_json::json!({
            "version": artifact.version(),
            "features": ["first_contentful_paint", "seo_score", "title_length"],
        });
        fs::write(&path, serde_json::to_vec(&body).unwrap()).unwrap();

        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_nothing_published() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("model"));
        assert_eq!(store.current_version().unwrap(), None);
        assert!(store.releases().unwrap().is_empty());
        assert_corrupt(store.load().unwrap_err());
    }

    #[test]
    fn test_republishing_same_content_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = default_artifact();

        let a = store.save(&artifact).unwrap();
        let b = store.save(&artifact).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.releases().unwrap().len(), 1);
    }

    #[test]
    fn test_prune_keeps_current() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store
            .save(&small_artifact(&[Feature::SeoScore, Feature::TitleLength]))
            .unwrap();
        store
            .save(&small_artifact(&[Feature::TitleLength, Feature::SeoScore]))
            .unwrap();
        let current = default_artifact();
        store.save(&current).unwrap();
        assert_eq!(store.releases().unwrap().len(), 3);

        let removed = store.prune_releases(1).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!removed.contains(&current.version().to_string()));

        let remaining = store.releases().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|r| r.is_current));
        assert_eq!(store.load().unwrap(), current);
    }
    #[test]
    fn test_republish_repairs_damaged_release() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = default_artifact();

        let release = store.save(&artifact).unwrap();
        fs::remove_file(release.join(SCALER_FILE)).unwrap();
        assert_corrupt(store.load().unwrap_err());

        let repaired = store.save(&artifact).unwrap();
        assert_eq!(repaired, release);
        assert_eq!(store.load().unwrap(), artifact);
        assert_eq!(store.releases().unwrap().len(), 1);

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "unexpected leftovers: {:?}", leftovers);
    }

    #[test]
    fn test_republish_replaces_partial_release() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = default_artifact();

        let partial = store.release_dir(artifact.version());
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join(CLASSIFIER_FILE), b"{\"version\":").unwrap();

        store.save(&artifact).unwrap();
        assert_eq!(store.load().unwrap(), artifact);
        assert!(partial.join(FEATURES_FILE).exists());
    }

    #[test]
    fn test_current_outside_store_refused() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("model"));
        store.save(&default_artifact()).unwrap();

        fs::write(store.root().join(CURRENT_FILE), "../../elsewhere\n").unwrap();
        assert_corrupt(store.current_version().unwrap_err());
        assert_corrupt(store.load().unwrap_err());
        assert_corrupt(store.load_release("../model").unwrap_err());
        assert_corrupt(store.load_report(&"A".repeat(64)).unwrap_err());
    }

    #[test]
    fn test_releases_skip_foreign_directories() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&default_artifact()).unwrap();
        fs::create_dir_all(dir.path().join(RELEASES_DIR).join("backup")).unwrap();

        let releases = store.releases().unwrap();
        assert_eq!(releases.len(), 1);
        assert!(is_valid_version(&releases[0].version));
        assert!(store.prune_releases(0).unwrap().is_empty());
    }

    #[test]
    fn test_version_shape() {
        assert!(is_valid_version(default_artifact().version()));
        assert!(!is_valid_version("abc"));
        assert!(!is_valid_version(&"A".repeat(64)));
        assert!(!is_valid_version(&format!("../{}", "a".repeat(61))));
    }
}

mod cache_tests {
    use super::*;

    #[test]
    fn test_cache_reuses_loaded_release() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&default_artifact()).unwrap();

        let cache = ArtifactCache::new(store.clone());
        assert!(cache.cached().is_none());
        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let newer = small_artifact(&[Feature::SeoScore, Feature::FirstContentfulPaint]);
        store.save(&newer).unwrap();
        let third = cache.get().unwrap();
        assert_eq!(third.version(), newer.version());

        cache.clear();
        assert!(cache.cached().is_none());
    }

    #[test]
    fn test_cache_surfaces_corruption() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let release = store.save(&default_artifact()).unwrap();
        fs::remove_file(release.join(CLASSIFIER_FILE)).unwrap();

        let cache = ArtifactCache::new(store);
        assert_corrupt(cache.get().unwrap_err());
    }
}
