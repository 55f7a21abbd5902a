//! Synthetic dataset generation
//!
//! Two modes are supported:
//! - `balanced`: equal class counts, metrics sampled from per-category bands
//! - `organic`: a mixture of website types where the performance score is
//!   derived from the sampled metrics; the resulting labels are imbalanced
//!
//! Both modes label rows from the performance score via the ordinal
//! thresholds and are fully determined by the seed.

use crate::error::{GradeError, Result};
use crate::models::{Dataset, LabeledRecord, MetricRecord, PerformanceCategory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Default number of generated rows
pub const DEFAULT_SAMPLES: usize = 400;

/// How labels and metrics are sampled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Balanced,
    Organic,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Organic => "organic",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "organic" => Ok(Self::Organic),
            other => Err(GradeError::Configuration(format!(
                "unknown generation mode '{}', expected balanced or organic",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub samples: usize,
    pub seed: u64,
    pub mode: GenerationMode,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: 42,
            mode: GenerationMode::Balanced,
        }
    }
}

/// Produce a labeled dataset; identical configs yield identical datasets
pub fn generate(config: &GeneratorConfig) -> Result<Dataset> {
    if config.samples == 0 {
        return Err(GradeError::Configuration(
            "sample count must be at least 1".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let rows = match config.mode {
        GenerationMode::Balanced => balanced_rows(config.samples, &mut rng),
        GenerationMode::Organic => organic_rows(config.samples, &mut rng),
    };
    let dataset = Dataset::new(rows);

    info!(
        rows = dataset.len(),
        seed = config.seed,
        mode = %config.mode,
        "Synthetic dataset generated"
    );
    Ok(dataset)
}

/// Metric bands per category: (performance, fcp, lcp)
fn category_bands(category: PerformanceCategory) -> [(f64, f64); 3] {
    match category {
        PerformanceCategory::Excellent => [(90.0, 100.0), (500.0, 1500.0), (1000.0, 2500.0)],
        PerformanceCategory::Good => [(75.0, 90.0), (1500.0, 2500.0), (2500.0, 3500.0)],
        PerformanceCategory::NeedsImprovement => [(50.0, 75.0), (2500.0, 3500.0), (3500.0, 4500.0)],
        PerformanceCategory::Poor => [(30.0, 50.0), (3500.0, 4000.0), (4500.0, 6000.0)],
    }
}

fn balanced_rows(samples: usize, rng: &mut StdRng) -> Vec<LabeledRecord> {
    let per_class = samples / PerformanceCategory::ALL.len();
    let remainder = samples % PerformanceCategory::ALL.len();
    let mut rows = Vec::with_capacity(samples);

    for (i, category) in PerformanceCategory::ALL.into_iter().enumerate() {
        let count = per_class + usize::from(i < remainder);
        let [(p_lo, p_hi), (fcp_lo, fcp_hi), (lcp_lo, lcp_hi)] = category_bands(category);

        for _ in 0..count {
            let mut perf = round_to(rng.gen_range(p_lo..p_hi), 1);
            // Keep rounding from pushing a score into the next band
            if p_hi < 100.0 {
                perf = perf.min(p_hi - 0.1);
            }
            let record = MetricRecord {
                first_contentful_paint: Some(rng.gen_range(fcp_lo..fcp_hi).round()),
                largest_contentful_paint: Some(rng.gen_range(lcp_lo..lcp_hi).round()),
                cumulative_layout_shift: Some(round_to(rng.gen_range(0.0..0.3), 3)),
                total_blocking_time: Some(rng.gen_range(0.0..500.0f64).round()),
                speed_index: Some(rng.gen_range(1000.0..5000.0f64).round()),
                server_response_time: Some(rng.gen_range(50.0..900.0f64).round()),
                total_byte_weight: Some(rng.gen_range(500.0..5000.0f64).round()),
                title_length: Some(rng.gen_range(10..80)),
                meta_description_exists: Some(rng.gen_bool(0.8)),
                image_alt_exists: Some(rng.gen_bool(0.75)),
                performance_score: Some(perf),
                seo_score: Some(scaled_score(perf, 0.8, 1.2, rng)),
                accessibility_score: Some(scaled_score(perf, 0.9, 1.1, rng)),
                best_practices_score: Some(scaled_score(perf, 0.85, 1.15, rng)),
            };
            rows.push(LabeledRecord {
                label: PerformanceCategory::from_score(perf),
                record,
            });
        }
        debug!(category = %category, rows = count, "Generated category rows");
    }
    rows
}

#[derive(Debug, Clone, Copy)]
enum WebsiteType {
    Ecommerce,
    Blog,
    Corporate,
    Portfolio,
    News,
}

impl WebsiteType {
    /// Mixture weights of the organic population
    const MIX: [(WebsiteType, f64); 5] = [
        (WebsiteType::Ecommerce, 0.30),
        (WebsiteType::Blog, 0.25),
        (WebsiteType::Corporate, 0.20),
        (WebsiteType::Portfolio, 0.15),
        (WebsiteType::News, 0.10),
    ];

    fn sample(rng: &mut StdRng) -> Self {
        let draw: f64 = rng.gen();
        let mut acc = 0.0;
        for (kind, weight) in Self::MIX {
            acc += weight;
            if draw < acc {
                return kind;
            }
        }
        WebsiteType::News
    }

    /// (fcp, lcp, base performance) ranges
    fn ranges(&self) -> [(f64, f64); 3] {
        match self {
            Self::Ecommerce => [(800.0, 3500.0), (1500.0, 5000.0), (40.0, 90.0)],
            Self::Blog => [(500.0, 2500.0), (1000.0, 4000.0), (60.0, 95.0)],
            Self::Corporate | Self::Portfolio | Self::News => {
                [(600.0, 3000.0), (1200.0, 4500.0), (50.0, 92.0)]
            }
        }
    }
}

fn organic_rows(samples: usize, rng: &mut StdRng) -> Vec<LabeledRecord> {
    (0..samples)
        .map(|_| {
            let kind = WebsiteType::sample(rng);
            let [(fcp_lo, fcp_hi), (lcp_lo, lcp_hi), (base_lo, base_hi)] = kind.ranges();
            let fcp = rng.gen_range(fcp_lo..fcp_hi);
            let lcp = rng.gen_range(lcp_lo..lcp_hi);
            let base = rng.gen_range(base_lo..base_hi);
            let cls = rng.gen_range(0.0..0.4f64);
            let tbt = rng.gen_range(0.0..600.0f64);
            let speed_index = rng.gen_range(1000.0..5000.0f64);
            let page_kb = rng.gen_range(500.0..8000.0f64);

            let penalty = fcp / 200.0 + lcp / 300.0 + cls * 50.0 + tbt / 30.0 + page_kb / 1000.0;
            let perf = round_to((base - penalty).clamp(0.0, 100.0), 1);

            let record = MetricRecord {
                first_contentful_paint: Some(fcp.round()),
                largest_contentful_paint: Some(lcp.round()),
                cumulative_layout_shift: Some(round_to(cls, 3)),
                total_blocking_time: Some(tbt.round()),
                speed_index: Some(speed_index.round()),
                total_byte_weight: Some(page_kb.round()),
                performance_score: Some(perf),
                seo_score: Some(scaled_score(perf, 0.8, 1.2, rng)),
                accessibility_score: Some(scaled_score(perf, 0.9, 1.1, rng)),
                best_practices_score: Some(scaled_score(perf, 0.85, 1.15, rng)),
                meta_description_exists: Some(rng.gen_bool(0.7)),
                title_length: Some(rng.gen_range(10..120)),
                ..Default::default()
            };
            LabeledRecord {
                label: PerformanceCategory::from_score(perf),
                record,
            }
        })
        .collect()
}

/// A score correlated with `perf`, clamped to [0, 100]
fn scaled_score(perf: f64, lo: f64, hi: f64, rng: &mut StdRng) -> f64 {
    round_to((perf * rng.gen_range(lo..hi)).clamp(0.0, 100.0), 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(1499.6, 0), 1500.0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Organic".parse::<GenerationMode>().unwrap(), GenerationMode::Organic);
        assert!("random".parse::<GenerationMode>().is_err());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let config = GeneratorConfig {
            samples: 0,
            ..Default::default()
        };
        assert!(matches!(generate(&config), Err(GradeError::Configuration(_))));
    }

    #[test]
    fn test_website_mix_covers_all_types() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 5];
        for _ in 0..500 {
            seen[WebsiteType::sample(&mut rng) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
