//! End-to-end pipeline tests
//!
//! Generate -> train -> publish -> load -> predict, plus the failure paths
//! that must stop the pipeline.

use grader_lib::artifact::{ArtifactCache, ArtifactStore, CLASSIFIER_FILE, FEATURES_FILE, SCALER_FILE};
use grader_lib::dataset::{
    generate, read_csv, stratified_split, write_csv, GenerationMode, GeneratorConfig,
};
use grader_lib::forest::ForestConfig;
use grader_lib::models::class_counts;
use grader_lib::predictor::predict;
use grader_lib::{
    Dataset, GradeError, InferenceEngine, LabeledRecord, MetricRecord, ModelArtifact,
    PerformanceCategory, Trainer, TrainerConfig,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

fn balanced_dataset() -> Dataset {
    generate(&GeneratorConfig {
        samples: 400,
        seed: 42,
        mode: GenerationMode::Balanced,
    })
    .unwrap()
}

/// Model trained once on the default balanced dataset and shared by the tests
fn shared_artifact() -> Arc<ModelArtifact> {
    static ARTIFACT: OnceLock<Arc<ModelArtifact>> = OnceLock::new();
    ARTIFACT
        .get_or_init(|| {
            let trainer = Trainer::new(TrainerConfig::default()).unwrap();
            Arc::new(trainer.train(&balanced_dataset()).unwrap().artifact)
        })
        .clone()
}

fn scenario_a() -> MetricRecord {
    MetricRecord {
        first_contentful_paint: Some(800.0),
        largest_contentful_paint: Some(1500.0),
        cumulative_layout_shift: Some(0.05),
        total_blocking_time: Some(100.0),
        total_byte_weight: Some(2000.0),
        meta_description_exists: Some(true),
        title_length: Some(50),
        seo_score: Some(85.0),
        accessibility_score: Some(88.0),
        ..Default::default()
    }
}

fn scenario_b() -> MetricRecord {
    MetricRecord {
        first_contentful_paint: Some(3800.0),
        largest_contentful_paint: Some(5500.0),
        cumulative_layout_shift: Some(0.30),
        total_blocking_time: Some(500.0),
        total_byte_weight: Some(7000.0),
        meta_description_exists: Some(false),
        title_length: Some(10),
        seo_score: Some(40.0),
        accessibility_score: Some(45.0),
        ..Default::default()
    }
}

fn quick_config(seed: u64) -> TrainerConfig {
    TrainerConfig {
        forest: ForestConfig {
            n_trees: 30,
            seed,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_fast_page_grades_well() {
    let artifact = shared_artifact();
    let prediction = predict(&scenario_a(), &artifact).unwrap();

    assert!(
        matches!(
            prediction.label,
            PerformanceCategory::Good | PerformanceCategory::Excellent
        ),
        "got {}",
        prediction.label
    );
    assert!(prediction.confidence > 0.4, "confidence {}", prediction.confidence);
    assert!(prediction.missing_features.is_empty());
}

#[test]
fn test_slow_page_grades_poor() {
    let artifact = shared_artifact();
    let prediction = predict(&scenario_b(), &artifact).unwrap();
    assert_eq!(prediction.label, PerformanceCategory::Poor);
}

#[test]
fn test_probabilities_form_a_distribution() {
    let artifact = shared_artifact();
    let inputs = generate(&GeneratorConfig {
        samples: 100,
        seed: 7,
        mode: GenerationMode::Organic,
    })
    .unwrap();

    for row in inputs.rows() {
        let prediction = predict(&row.record, &artifact).unwrap();
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-6, "sum was {}", total);
        assert!(prediction.probabilities.values().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(prediction.probabilities.len(), 4);
        assert_eq!(prediction.confidence, prediction.probabilities[&prediction.label]);
    }
}

#[test]
fn test_training_is_deterministic() {
    let dataset = balanced_dataset();
    let first = Trainer::new(quick_config(42)).unwrap().train(&dataset).unwrap();
    let second = Trainer::new(quick_config(42)).unwrap().train(&dataset).unwrap();
    assert_eq!(first.artifact.version(), second.artifact.version());

    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let release_a = ArtifactStore::new(dir_a.path()).save(&first.artifact).unwrap();
    let release_b = ArtifactStore::new(dir_b.path()).save(&second.artifact).unwrap();
    for file in [CLASSIFIER_FILE, SCALER_FILE, FEATURES_FILE] {
        let a = std::fs::read(release_a.join(file)).unwrap();
        let b = std::fs::read(release_b.join(file)).unwrap();
        assert_eq!(a, b, "{} differs between runs", file);
    }

    let other = Trainer::new(quick_config(7)).unwrap().train(&dataset).unwrap();
    assert_ne!(first.artifact.version(), other.artifact.version());
}

#[test]
fn test_held_out_fold_is_never_balanced() {
    let dataset = generate(&GeneratorConfig {
        samples: 300,
        seed: 11,
        mode: GenerationMode::Organic,
    })
    .unwrap();
    let config = quick_config(42);
    let outcome = Trainer::new(config.clone()).unwrap().train(&dataset).unwrap();

    let labels = dataset.labels();
    let split = stratified_split(&labels, config.test_fraction, config.forest.seed).unwrap();
    let expected_test = class_counts(split.test.iter().map(|&i| labels[i]));

    let reported_test: std::collections::BTreeMap<_, _> = outcome
        .report
        .per_class
        .iter()
        .filter(|(_, m)| m.support > 0)
        .map(|(c, m)| (*c, m.support))
        .collect();
    assert_eq!(reported_test, expected_test);
    assert_eq!(outcome.report.held_out, split.test.len());

    let balance = outcome.balance.unwrap();
    let target = *balance.before.values().max().unwrap();
    assert!(balance.after.values().all(|c| *c == target));
    assert!(outcome.train_rows > split.train.len());
}

#[test]
fn test_single_class_dataset_writes_no_artifact() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("one_class.csv");
    let rows = balanced_dataset()
        .rows()
        .iter()
        .filter(|r| r.label == PerformanceCategory::Good)
        .cloned()
        .collect::<Vec<LabeledRecord>>();
    write_csv(&Dataset::new(rows), &csv).unwrap();

    let dataset = read_csv(&csv).unwrap();
    let store = ArtifactStore::new(dir.path().join("model"));
    let result = Trainer::new(quick_config(42))
        .unwrap()
        .train(&dataset)
        .and_then(|outcome| store.save(&outcome.artifact));

    assert!(matches!(result, Err(GradeError::DataIntegrity(_))));
    assert!(!store.root().exists());
    assert_eq!(store.current_version().unwrap(), None);
}

#[test]
fn test_missing_scaler_refuses_inference() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let release = store.save(&shared_artifact()).unwrap();
    std::fs::remove_file(release.join(SCALER_FILE)).unwrap();

    assert!(matches!(store.load(), Err(GradeError::ArtifactCorruption(_))));
    let cache = ArtifactCache::new(store);
    assert!(matches!(cache.get(), Err(GradeError::ArtifactCorruption(_))));
}

#[test]
fn test_loading_and_predicting_twice_is_identical() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save(&shared_artifact()).unwrap();

    let first = store.load().unwrap();
    let second = store.load().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.version(), shared_artifact().version());

    let a = predict(&scenario_a(), &first).unwrap();
    let b = predict(&scenario_a(), &second).unwrap();
    assert_eq!(a, b);
    assert_eq!(predict(&scenario_a(), &first).unwrap(), a);
}

#[test]
fn test_concurrent_inference_on_shared_artifact() {
    let engine = InferenceEngine::new(shared_artifact());
    let inputs = generate(&GeneratorConfig {
        samples: 64,
        seed: 5,
        mode: GenerationMode::Balanced,
    })
    .unwrap();
    let expected: Vec<_> = inputs
        .rows()
        .iter()
        .map(|r| predict(&r.record, engine.artifact()).unwrap())
        .collect();

    std::thread::scope(|scope| {
        for chunk in inputs.rows().chunks(8).zip(expected.chunks(8)) {
            let engine = engine.clone();
            scope.spawn(move || {
                let (rows, expected) = chunk;
                for (row, want) in rows.iter().zip(expected) {
                    assert_eq!(&engine.predict_record(&row.record).unwrap(), want);
                }
            });
        }
    });
    assert_eq!(engine.stats().total_predictions, 64);
}

#[test]
fn test_metrics_mapping_contract() {
    let engine = InferenceEngine::new(shared_artifact());
    let mut metrics: HashMap<String, f64> = scenario_b()
        .to_metrics()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    metrics.remove("seo_score");
    metrics.insert("time_to_interactive".to_string(), 9000.0);

    let prediction = engine.predict_metrics(&metrics).unwrap();
    assert_eq!(prediction.missing_features, vec!["seo_score"]);
    assert_eq!(prediction.model_version, shared_artifact().version());

    metrics.insert("meta_description_exists".to_string(), 0.5);
    assert!(matches!(
        engine.predict_metrics(&metrics),
        Err(GradeError::DataIntegrity(_))
    ));
    assert_eq!(engine.stats().rejected, 1);
}

#[test]
fn test_non_finite_values_are_refused() {
    let record = MetricRecord {
        first_contentful_paint: Some(f64::NAN),
        ..scenario_a()
    };
    let err = predict(&record, &shared_artifact()).unwrap_err();
    assert!(matches!(err, GradeError::DataIntegrity(_)));
}

#[test]
fn test_low_confidence_threshold_is_configurable() {
    let artifact = shared_artifact();
    let sparse = MetricRecord {
        seo_score: Some(60.0),
        ..Default::default()
    };

    let lenient = InferenceEngine::new(artifact.clone()).with_low_confidence_threshold(0.0);
    let prediction = lenient.predict_record(&sparse).unwrap();
    assert!(!prediction.is_low_confidence());
    assert!(!prediction.missing_features.is_empty());

    let strict = InferenceEngine::new(artifact).with_low_confidence_threshold(1.0);
    let prediction = strict.predict_record(&sparse).unwrap();
    assert_eq!(prediction.is_low_confidence(), prediction.confidence < 1.0);
}
