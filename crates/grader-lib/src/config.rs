//! Pipeline configuration
//!
//! Values come from an optional config file (TOML, JSON or YAML by
//! extension) overlaid by `SITEGRADE_*` environment variables, e.g.
//! `SITEGRADE_N_TREES=150` or `SITEGRADE_FEATURE_ORDER=seo_score,title_length`.

use crate::artifact::ArtifactStore;
use crate::balance::BalancerConfig;
use crate::dataset::{GenerationMode, GeneratorConfig, DEFAULT_SAMPLES, DEFAULT_TEST_FRACTION};
use crate::error::{GradeError, Result};
use crate::forest::{ClassWeight, ForestConfig, MaxFeatures, DEFAULT_MAX_DEPTH, DEFAULT_N_TREES};
use crate::predictor::DEFAULT_LOW_CONFIDENCE_THRESHOLD;
use crate::preprocess::FeatureSchema;
use crate::training::TrainerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SITEGRADE";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Labeled CSV used for training
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,

    /// Root of the model release store
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Master seed for generation, splitting, balancing and tree fitting
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_samples")]
    pub samples: usize,

    #[serde(default)]
    pub generation_mode: GenerationMode,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// Features examined per split: "sqrt", "all" or a count
    #[serde(default)]
    pub max_features: MaxFeatures,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Oversample minority classes in the training fold
    #[serde(default = "default_balance")]
    pub balance: bool,

    #[serde(default = "default_k_neighbors")]
    pub k_neighbors: usize,

    /// Per-class count after balancing (default: majority count)
    #[serde(default)]
    pub target_count: Option<usize>,

    /// Only used when balancing is disabled
    #[serde(default)]
    pub class_weight: ClassWeight,

    /// Threads for tree fitting (default: all cores)
    #[serde(default)]
    pub n_jobs: Option<usize>,

    /// Feature names in model input order (default: the built-in order)
    #[serde(default)]
    pub feature_order: Option<Vec<String>>,

    /// Predictions below this confidence carry a low-confidence reason
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("data/model")
}

fn default_seed() -> u64 {
    42
}

fn default_samples() -> usize {
    DEFAULT_SAMPLES
}

fn default_n_trees() -> usize {
    DEFAULT_N_TREES
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_min_samples_split() -> usize {
    5
}

fn default_min_samples_leaf() -> usize {
    2
}

fn default_test_fraction() -> f64 {
    DEFAULT_TEST_FRACTION
}

fn default_balance() -> bool {
    true
}

fn default_low_confidence_threshold() -> f64 {
    DEFAULT_LOW_CONFIDENCE_THRESHOLD
}

fn default_k_neighbors() -> usize {
    crate::balance::DEFAULT_K_NEIGHBORS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_path: None,
            artifact_dir: default_artifact_dir(),
            seed: default_seed(),
            samples: default_samples(),
            generation_mode: GenerationMode::default(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: MaxFeatures::default(),
            test_fraction: default_test_fraction(),
            balance: default_balance(),
            k_neighbors: default_k_neighbors(),
            target_count: None,
            class_weight: ClassWeight::default(),
            n_jobs: None,
            feature_order: None,
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional file and the environment, then validate
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            if !path.exists() {
                return Err(GradeError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("feature_order"),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| GradeError::Configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.trainer_config()?.validate()?;
        if self.samples == 0 {
            return Err(GradeError::Configuration(
                "samples must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(GradeError::Configuration(format!(
                "low_confidence_threshold must be within [0, 1], got {}",
                self.low_confidence_threshold
            )));
        }
        if self.k_neighbors == 0 {
            return Err(GradeError::Configuration(
                "k_neighbors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Dataset path, required by training
    pub fn require_dataset_path(&self) -> Result<&Path> {
        self.dataset_path.as_deref().ok_or_else(|| {
            GradeError::Configuration(
                "no dataset path configured (set dataset_path or SITEGRADE_DATASET_PATH)".to_string(),
            )
        })
    }

    pub fn schema(&self) -> Result<FeatureSchema> {
        match &self.feature_order {
            Some(names) => FeatureSchema::from_names(names),
            None => Ok(FeatureSchema::default()),
        }
    }

    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.n_trees,
            max_depth: Some(self.max_depth),
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            bootstrap: true,
            seed: self.seed,
            class_weight: self.class_weight,
            n_jobs: self.n_jobs,
        }
    }

    pub fn trainer_config(&self) -> Result<TrainerConfig> {
        Ok(TrainerConfig {
            schema: self.schema()?,
            forest: self.forest_config(),
            test_fraction: self.test_fraction,
            balance: self.balance,
            balancer: BalancerConfig {
                k_neighbors: self.k_neighbors,
                target_count: self.target_count,
            },
        })
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            samples: self.samples,
            seed: self.seed,
            mode: self.generation_mode,
        }
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.artifact_dir)
    }
}
