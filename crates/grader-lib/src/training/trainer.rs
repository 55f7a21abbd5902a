//! End-to-end training run
//!
//! split -> fit scaler on the training fold -> balance the training fold ->
//! fit the forest -> evaluate on the untouched held-out fold -> bundle.

use super::evaluation::EvaluationReport;
use crate::artifact::ModelArtifact;
use crate::balance::{BalanceReport, BalancerConfig, SmoteBalancer};
use crate::dataset::{stratified_split, DEFAULT_TEST_FRACTION};
use crate::error::{GradeError, PipelineWarning, Result};
use crate::forest::{ClassWeight, ForestConfig, RandomForest};
use crate::models::{class_counts, Dataset, PerformanceCategory};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::preprocess::{FeatureSchema, StandardScaler};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub schema: FeatureSchema,
    /// Forest hyper-parameters; `forest.seed` also drives the split and the balancer
    pub forest: ForestConfig,
    pub test_fraction: f64,
    /// Oversample minority classes in the training fold
    pub balance: bool,
    pub balancer: BalancerConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            schema: FeatureSchema::default(),
            forest: ForestConfig::default(),
            test_fraction: DEFAULT_TEST_FRACTION,
            balance: true,
            balancer: BalancerConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        self.forest.validate()?;
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(GradeError::Configuration(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.balance && self.balancer.k_neighbors == 0 {
            return Err(GradeError::Configuration(
                "k_neighbors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: EvaluationReport,
    /// Present when balancing ran
    pub balance: Option<BalanceReport>,
    pub warnings: Vec<PipelineWarning>,
    /// Training rows after balancing
    pub train_rows: usize,
    pub duration: Duration,
}

pub struct Trainer {
    config: TrainerConfig,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("trainer"),
        })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome> {
        let started = Instant::now();
        let distribution = dataset.class_distribution();
        if distribution.len() < 2 {
            return Err(GradeError::DataIntegrity(format!(
                "dataset has {} row(s) and {} distinct class(es), at least 2 classes are required",
                dataset.len(),
                distribution.len()
            )));
        }
        info!(
            rows = dataset.len(),
            classes = distribution.len(),
            features = self.config.schema.len(),
            "Starting training run"
        );

        let seed = self.config.forest.seed;
        let schema = &self.config.schema;
        let labels = dataset.labels();
        let split = stratified_split(&labels, self.config.test_fraction, seed)?;

        let fold = |indices: &[usize]| -> (Vec<Vec<f64>>, Vec<PerformanceCategory>) {
            let rows = indices.iter().map(|&i| &dataset.rows()[i]);
            (
                schema.encode_all(rows.clone().map(|row| &row.record)),
                rows.map(|row| row.label).collect(),
            )
        };
        let (train_x, train_y) = fold(&split.train);
        let (test_x, test_y) = fold(&split.test);
        debug!(train = train_x.len(), test = test_x.len(), "Dataset split");

        let mut warnings = Vec::new();

        let scaler = StandardScaler::fit(&train_x)?;
        for i in scaler.constant_features() {
            warnings.push(PipelineWarning::DegenerateFeature {
                feature: schema.features()[i].as_str().to_string(),
            });
        }
        let train_scaled = scaler.transform_all(&train_x)?;
        let test_scaled = scaler.transform_all(&test_x)?;

        let mut forest_config = self.config.forest.clone();
        let (fit_x, fit_y, balance) = if self.config.balance {
            if forest_config.class_weight != ClassWeight::None {
                debug!("Class weighting is ignored when the training fold is balanced");
                forest_config.class_weight = ClassWeight::None;
            }
            let balancer = SmoteBalancer::new(self.config.balancer.clone())?;
            let mut rng = StdRng::seed_from_u64(seed);
            let set = balancer.balance(&train_scaled, &train_y, &mut rng)?;
            warnings.extend(set.report.warnings.iter().cloned());
            self.metrics.add_synthetic_samples(set.report.total_synthesized());
            (set.features, set.labels, Some(set.report))
        } else {
            (train_scaled, train_y, None)
        };

        let forest = RandomForest::fit(&fit_x, &fit_y, &forest_config)?;

        let predicted = test_scaled
            .iter()
            .map(|x| forest.predict(x))
            .collect::<Result<Vec<_>>>()?;
        if test_y.is_empty() {
            warn!("Held-out fold is empty, evaluation metrics are not meaningful");
        }
        let report = EvaluationReport::compute(
            forest.classes(),
            &test_y,
            &predicted,
            schema.features(),
            forest.feature_importances(),
            class_counts(fit_y.iter().copied()),
        );

        let artifact = ModelArtifact::new(forest, scaler, schema.clone())?;
        let duration = started.elapsed();

        for warning in &warnings {
            self.logger.log_warning(warning);
        }
        self.metrics.observe_training_duration(duration.as_secs_f64());
        self.logger.log_training_completed(
            artifact.version(),
            report.accuracy,
            fit_x.len(),
            report.held_out,
            balance.as_ref().map_or(0, |b| b.total_synthesized()),
            duration.as_secs_f64(),
        );

        Ok(TrainingOutcome {
            artifact,
            report,
            balance,
            warnings,
            train_rows: fit_x.len(),
            duration,
        })
    }
}
