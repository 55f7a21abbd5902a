//! Feature schema and record encoding
//!
//! Maps a [`MetricRecord`] onto a fixed-order numeric vector. The order is
//! part of the model contract and is persisted with every artifact.

use crate::error::{GradeError, Result};
use crate::models::{Feature, MetricRecord};
use serde::{Deserialize, Serialize};

/// Value used for a feature the record does not carry
///
/// The model cannot tell this apart from a measured zero.
pub const MISSING_VALUE: f64 = 0.0;

/// Default feature order used for training
pub const DEFAULT_FEATURE_ORDER: [Feature; 9] = [
    Feature::FirstContentfulPaint,
    Feature::LargestContentfulPaint,
    Feature::CumulativeLayoutShift,
    Feature::TotalBlockingTime,
    Feature::TotalByteWeight,
    Feature::MetaDescriptionExists,
    Feature::TitleLength,
    Feature::SeoScore,
    Feature::AccessibilityScore,
];

/// Ordered list of features a model consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    order: Vec<Feature>,
}

impl FeatureSchema {
    pub fn new(order: Vec<Feature>) -> Result<Self> {
        if order.is_empty() {
            return Err(GradeError::Configuration(
                "feature order must not be empty".to_string(),
            ));
        }
        for (i, feature) in order.iter().enumerate() {
            if order[..i].contains(feature) {
                return Err(GradeError::Configuration(format!(
                    "feature '{}' listed more than once",
                    feature
                )));
            }
        }
        Ok(Self { order })
    }

    /// Parse a persisted or configured list of feature names
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let order = names
            .iter()
            .map(|n| {
                n.as_ref()
                    .parse::<Feature>()
                    .map_err(|_| GradeError::Configuration(format!("unknown feature '{}'", n.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(order)
    }

    pub fn features(&self) -> &[Feature] {
        &self.order
    }

    pub fn names(&self) -> Vec<String> {
        self.order.iter().map(|f| f.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn encode(&self, record: &MetricRecord) -> Vec<f64> {
        encode(record, &self.order)
    }

    pub fn encode_all<'a>(&self, records: impl IntoIterator<Item = &'a MetricRecord>) -> Vec<Vec<f64>> {
        records.into_iter().map(|r| self.encode(r)).collect()
    }

    /// Features of the schema the record does not carry
    pub fn missing_features(&self, record: &MetricRecord) -> Vec<Feature> {
        self.order
            .iter()
            .copied()
            .filter(|f| record.get(*f).is_none())
            .collect()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            order: DEFAULT_FEATURE_ORDER.to_vec(),
        }
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = GradeError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::from_names(&names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names()
    }
}

/// Encode a record in the given feature order, missing fields as [`MISSING_VALUE`]
pub fn encode(record: &MetricRecord, feature_order: &[Feature]) -> Vec<f64> {
    feature_order
        .iter()
        .map(|f| record.get(*f).unwrap_or(MISSING_VALUE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MetricRecord {
        MetricRecord {
            first_contentful_paint: Some(800.0),
            largest_contentful_paint: Some(1500.0),
            meta_description_exists: Some(true),
            title_length: Some(50),
            seo_score: Some(85.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_follows_order() {
        let order = [Feature::SeoScore, Feature::FirstContentfulPaint, Feature::MetaDescriptionExists];
        assert_eq!(encode(&sample_record(), &order), vec![85.0, 800.0, 1.0]);
    }

    #[test]
    fn test_missing_defaults_to_zero() {
        let schema = FeatureSchema::default();
        let vector = schema.encode(&sample_record());
        assert_eq!(vector.len(), DEFAULT_FEATURE_ORDER.len());
        // cumulative_layout_shift is absent from the record
        assert_eq!(vector[2], MISSING_VALUE);
        let missing = schema.missing_features(&sample_record());
        assert!(missing.contains(&Feature::CumulativeLayoutShift));
        assert!(missing.contains(&Feature::AccessibilityScore));
        assert!(!missing.contains(&Feature::SeoScore));
    }

    #[test]
    fn test_schema_rejects_duplicates_and_unknowns() {
        assert!(FeatureSchema::new(vec![]).is_err());
        assert!(FeatureSchema::new(vec![Feature::SeoScore, Feature::SeoScore]).is_err());
        assert!(FeatureSchema::from_names(&["seo_score", "page_rank"]).is_err());
    }

    #[test]
    fn test_schema_serializes_as_names() {
        let schema = FeatureSchema::from_names(&["speed_index", "seo_score"]).unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"["speed_index","seo_score"]"#);
        let back: FeatureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["bogus"]"#).is_err());
    }
}
