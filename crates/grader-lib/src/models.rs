//! Core data models for the grading pipeline

use crate::error::{GradeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Name of the label column in tabular datasets
pub const LABEL_COLUMN: &str = "performance_category";

/// Four-class quality verdict
///
/// Variants are declared in ordinal order (worst first). That order is only
/// meaningful to the dataset generator; the classifier treats labels as
/// nominal and orders them by their text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PerformanceCategory {
    Poor,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
    Good,
    Excellent,
}

impl PerformanceCategory {
    pub const ALL: [PerformanceCategory; 4] = [
        PerformanceCategory::Poor,
        PerformanceCategory::NeedsImprovement,
        PerformanceCategory::Good,
        PerformanceCategory::Excellent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poor => "Poor",
            Self::NeedsImprovement => "Needs Improvement",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        }
    }

    /// Ordinal thresholds: <50 Poor, 50–75 Needs Improvement, 75–90 Good, ≥90 Excellent
    pub fn from_score(performance_score: f64) -> Self {
        if performance_score >= 90.0 {
            Self::Excellent
        } else if performance_score >= 75.0 {
            Self::Good
        } else if performance_score >= 50.0 {
            Self::NeedsImprovement
        } else {
            Self::Poor
        }
    }

    /// Half-open performance score band `[low, high)` covered by the category
    pub fn score_band(&self) -> (f64, f64) {
        match self {
            Self::Poor => (0.0, 50.0),
            Self::NeedsImprovement => (50.0, 75.0),
            Self::Good => (75.0, 90.0),
            Self::Excellent => (90.0, 100.0),
        }
    }
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerformanceCategory {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Poor" => Ok(Self::Poor),
            "Needs Improvement" => Ok(Self::NeedsImprovement),
            "Good" => Ok(Self::Good),
            "Excellent" => Ok(Self::Excellent),
            other => Err(GradeError::DataIntegrity(format!(
                "unknown performance category '{}'",
                other
            ))),
        }
    }
}

/// Every field a Metric Record can carry, in dataset column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    FirstContentfulPaint,
    LargestContentfulPaint,
    CumulativeLayoutShift,
    TotalBlockingTime,
    SpeedIndex,
    ServerResponseTime,
    TotalByteWeight,
    TitleLength,
    MetaDescriptionExists,
    ImageAltExists,
    PerformanceScore,
    SeoScore,
    AccessibilityScore,
    BestPracticesScore,
}

impl Feature {
    pub const ALL: [Feature; 14] = [
        Feature::FirstContentfulPaint,
        Feature::LargestContentfulPaint,
        Feature::CumulativeLayoutShift,
        Feature::TotalBlockingTime,
        Feature::SpeedIndex,
        Feature::ServerResponseTime,
        Feature::TotalByteWeight,
        Feature::TitleLength,
        Feature::MetaDescriptionExists,
        Feature::ImageAltExists,
        Feature::PerformanceScore,
        Feature::SeoScore,
        Feature::AccessibilityScore,
        Feature::BestPracticesScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstContentfulPaint => "first_contentful_paint",
            Self::LargestContentfulPaint => "largest_contentful_paint",
            Self::CumulativeLayoutShift => "cumulative_layout_shift",
            Self::TotalBlockingTime => "total_blocking_time",
            Self::SpeedIndex => "speed_index",
            Self::ServerResponseTime => "server_response_time",
            Self::TotalByteWeight => "total_byte_weight",
            Self::TitleLength => "title_length",
            Self::MetaDescriptionExists => "meta_description_exists",
            Self::ImageAltExists => "image_alt_exists",
            Self::PerformanceScore => "performance_score",
            Self::SeoScore => "seo_score",
            Self::AccessibilityScore => "accessibility_score",
            Self::BestPracticesScore => "best_practices_score",
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Self::MetaDescriptionExists | Self::ImageAltExists)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| GradeError::DataIntegrity(format!("unknown feature '{}'", name)))
    }
}

/// Largest distance from an integer still accepted for `title_length`
pub const LENGTH_TOLERANCE: f64 = 1e-6;

/// One measurement snapshot for a URL+device
///
/// Every field is optional so that "not measured" stays distinguishable
/// from a measured zero until the record is encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_contentful_paint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_layout_shift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_blocking_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_response_time: Option<f64>,
    /// Kilobytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_byte_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_alt_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_practices_score: Option<f64>,
}

impl MetricRecord {
    /// Numeric value of a field, flags as 0/1
    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::FirstContentfulPaint => self.first_contentful_paint,
            Feature::LargestContentfulPaint => self.largest_contentful_paint,
            Feature::CumulativeLayoutShift => self.cumulative_layout_shift,
            Feature::TotalBlockingTime => self.total_blocking_time,
            Feature::SpeedIndex => self.speed_index,
            Feature::ServerResponseTime => self.server_response_time,
            Feature::TotalByteWeight => self.total_byte_weight,
            Feature::TitleLength => self.title_length.map(f64::from),
            Feature::MetaDescriptionExists => self.meta_description_exists.map(flag_value),
            Feature::ImageAltExists => self.image_alt_exists.map(flag_value),
            Feature::PerformanceScore => self.performance_score,
            Feature::SeoScore => self.seo_score,
            Feature::AccessibilityScore => self.accessibility_score,
            Feature::BestPracticesScore => self.best_practices_score,
        }
    }

    /// Set a field from its numeric form, validating flags and lengths
    ///
    /// Flags must be exactly 0 or 1. `title_length` accepts values within
    /// [`LENGTH_TOLERANCE`] of a non-negative integer and rounds them, so
    /// lengths that went through float arithmetic upstream still load;
    /// genuinely fractional lengths such as 42.5 are refused.
    pub fn set(&mut self, feature: Feature, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(GradeError::DataIntegrity(format!(
                "non-finite value for {}",
                feature
            )));
        }
        match feature {
            Feature::FirstContentfulPaint => self.first_contentful_paint = Some(value),
            Feature::LargestContentfulPaint => self.largest_contentful_paint = Some(value),
            Feature::CumulativeLayoutShift => self.cumulative_layout_shift = Some(value),
            Feature::TotalBlockingTime => self.total_blocking_time = Some(value),
            Feature::SpeedIndex => self.speed_index = Some(value),
            Feature::ServerResponseTime => self.server_response_time = Some(value),
            Feature::TotalByteWeight => self.total_byte_weight = Some(value),
            Feature::TitleLength => {
                let rounded = value.round();
                if rounded < 0.0
                    || (value - rounded).abs() > LENGTH_TOLERANCE
                    || rounded > f64::from(u32::MAX)
                {
                    return Err(GradeError::DataIntegrity(format!(
                        "title_length must be a non-negative integer, got {}",
                        value
                    )));
                }
                self.title_length = Some(rounded as u32);
            }
            Feature::MetaDescriptionExists => self.meta_description_exists = Some(parse_flag(feature, value)?),
            Feature::ImageAltExists => self.image_alt_exists = Some(parse_flag(feature, value)?),
            Feature::PerformanceScore => self.performance_score = Some(value),
            Feature::SeoScore => self.seo_score = Some(value),
            Feature::AccessibilityScore => self.accessibility_score = Some(value),
            Feature::BestPracticesScore => self.best_practices_score = Some(value),
        }
        Ok(())
    }

    /// Build a record from the flat metrics mapping handed over by the
    /// measurement integration layer. Unknown names are ignored.
    pub fn from_metrics(metrics: &HashMap<String, f64>) -> Result<Self> {
        let mut record = Self::default();
        for (name, value) in metrics {
            match name.parse::<Feature>() {
                Ok(feature) => record.set(feature, *value)?,
                Err(_) => tracing::debug!(metric = %name, "Ignoring unknown metric"),
            }
        }
        Ok(record)
    }

    /// Flat mapping of the measured fields only
    pub fn to_metrics(&self) -> BTreeMap<&'static str, f64> {
        Feature::ALL
            .iter()
            .filter_map(|f| self.get(*f).map(|v| (f.as_str(), v)))
            .collect()
    }
}

fn flag_value(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn parse_flag(feature: Feature, value: f64) -> Result<bool> {
    if value == 0.0 {
        Ok(false)
    } else if value == 1.0 {
        Ok(true)
    } else {
        Err(GradeError::DataIntegrity(format!(
            "{} must be 0 or 1, got {}",
            feature, value
        )))
    }
}

/// A record together with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub record: MetricRecord,
    pub label: PerformanceCategory,
}

/// Ordered, immutable collection of labeled records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<LabeledRecord>,
}

impl Dataset {
    pub fn new(rows: Vec<LabeledRecord>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LabeledRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<PerformanceCategory> {
        self.rows.iter().map(|r| r.label).collect()
    }

    pub fn class_distribution(&self) -> BTreeMap<PerformanceCategory, usize> {
        class_counts(self.rows.iter().map(|r| r.label))
    }

    pub fn distinct_classes(&self) -> usize {
        self.class_distribution().len()
    }
}

/// Count occurrences of each label
pub fn class_counts(
    labels: impl IntoIterator<Item = PerformanceCategory>,
) -> BTreeMap<PerformanceCategory, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_thresholds() {
        assert_eq!(PerformanceCategory::from_score(10.0), PerformanceCategory::Poor);
        assert_eq!(PerformanceCategory::from_score(49.9), PerformanceCategory::Poor);
        assert_eq!(
            PerformanceCategory::from_score(50.0),
            PerformanceCategory::NeedsImprovement
        );
        assert_eq!(PerformanceCategory::from_score(75.0), PerformanceCategory::Good);
        assert_eq!(PerformanceCategory::from_score(89.9), PerformanceCategory::Good);
        assert_eq!(PerformanceCategory::from_score(90.0), PerformanceCategory::Excellent);
    }

    #[test]
    fn test_category_text_form() {
        for category in PerformanceCategory::ALL {
            let parsed: PerformanceCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("Average".parse::<PerformanceCategory>().is_err());
        let json = serde_json::to_string(&PerformanceCategory::NeedsImprovement).unwrap();
        assert_eq!(json, "\"Needs Improvement\"");
    }

    #[test]
    fn test_feature_names_are_unique() {
        let mut names: Vec<_> = Feature::ALL.iter().map(|f| f.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Feature::ALL.len());
        assert_eq!("speed_index".parse::<Feature>().unwrap(), Feature::SpeedIndex);
    }

    #[test]
    fn test_record_from_metrics() {
        let mut metrics = HashMap::new();
        metrics.insert("first_contentful_paint".to_string(), 800.0);
        metrics.insert("meta_description_exists".to_string(), 1.0);
        metrics.insert("title_length".to_string(), 50.0);
        metrics.insert("time_to_interactive".to_string(), 4000.0);

        let record = MetricRecord::from_metrics(&metrics).unwrap();
        assert_eq!(record.first_contentful_paint, Some(800.0));
        assert_eq!(record.meta_description_exists, Some(true));
        assert_eq!(record.title_length, Some(50));
        assert_eq!(record.speed_index, None);
    }

    #[test]
    fn test_missing_and_zero_are_distinct() {
        let mut record = MetricRecord::default();
        assert_eq!(record.get(Feature::TotalBlockingTime), None);
        record.set(Feature::TotalBlockingTime, 0.0).unwrap();
        assert_eq!(record.get(Feature::TotalBlockingTime), Some(0.0));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut record = MetricRecord::default();
        assert!(record.set(Feature::MetaDescriptionExists, 0.5).is_err());
        assert!(record.set(Feature::TitleLength, -3.0).is_err());
        assert!(record.set(Feature::SeoScore, f64::NAN).is_err());
        assert!(record.set(Feature::TitleLength, 42.5).is_err());
    }

    #[test]
    fn test_near_integral_title_length_rounds() {
        let mut record = MetricRecord::default();
        record.set(Feature::TitleLength, 42.0000001).unwrap();
        assert_eq!(record.title_length, Some(42));
        record.set(Feature::TitleLength, 56.9999999).unwrap();
        assert_eq!(record.title_length, Some(57));
        assert!(record.set(Feature::TitleLength, 42.001).is_err());
    }

    #[test]
    fn test_dataset_distribution() {
        let rows = vec![
            LabeledRecord { record: MetricRecord::default(), label: PerformanceCategory::Poor },
            LabeledRecord { record: MetricRecord::default(), label: PerformanceCategory::Poor },
            LabeledRecord { record: MetricRecord::default(), label: PerformanceCategory::Good },
        ];
        let dataset = Dataset::new(rows);
        let dist = dataset.class_distribution();
        assert_eq!(dist[&PerformanceCategory::Poor], 2);
        assert_eq!(dist[&PerformanceCategory::Good], 1);
        assert_eq!(dataset.distinct_classes(), 2);
    }
}
