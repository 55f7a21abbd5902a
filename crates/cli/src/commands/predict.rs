//! Prediction CLI command

use anyhow::{bail, Context, Result};
use colored::Colorize;
use grader_lib::{ArtifactStore, InferenceEngine};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    color_confidence, color_label, format_percent, print_heading, print_json, print_table,
    print_warning, short_id, OutputFormat,
};

/// Row for class probabilities table
#[derive(Tabled)]
struct ProbabilityRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Grade a metrics mapping against the published model
pub fn predict(
    store: &ArtifactStore,
    low_confidence_threshold: f64,
    input: Option<&str>,
    pairs: &[String],
    format: OutputFormat,
) -> Result<()> {
    let mut metrics = match input {
        Some(source) => parse_metrics_json(&read_input(source)?)?,
        None => HashMap::new(),
    };
    for pair in pairs {
        let (name, value) = parse_metric_pair(pair)?;
        metrics.insert(name, value);
    }
    if metrics.is_empty() {
        bail!("No metrics given; pass --input <file|-> or --metric name=value");
    }

    let artifact = store
        .load()
        .with_context(|| format!("Cannot load model from {}", store.root().display()))?;
    let engine = InferenceEngine::new(Arc::new(artifact))
        .with_low_confidence_threshold(low_confidence_threshold);
    let prediction = engine.predict_metrics(&metrics)?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            print_heading("Prediction");
            println!(
                "Grade:                  {}",
                color_label(prediction.label.as_str())
            );
            println!(
                "Confidence:             {}",
                color_confidence(prediction.confidence)
            );
            println!(
                "Model:                  {}",
                short_id(&prediction.model_version).dimmed()
            );
            println!();

            let rows: Vec<ProbabilityRow> = prediction
                .ranked()
                .into_iter()
                .map(|(class, p)| ProbabilityRow {
                    class: class.to_string(),
                    probability: format_percent(p),
                })
                .collect();
            print_table(rows);

            if !prediction.missing_features.is_empty() {
                print_warning(&format!(
                    "Missing metrics scored as 0: {}",
                    prediction.missing_features.join(", ")
                ));
            }
            if let Some(reason) = &prediction.low_confidence_reason {
                print_warning(&format!("Low confidence: {}", reason));
            }
        }
    }

    Ok(())
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read metrics from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
    }
}

/// Flat JSON object of metric name to number or boolean; nulls are skipped
fn parse_metrics_json(text: &str) -> Result<HashMap<String, f64>> {
    let value: Value = serde_json::from_str(text).context("Metrics input is not valid JSON")?;
    let Value::Object(object) = value else {
        bail!("Metrics input must be a JSON object of name to value");
    };

    let mut metrics = HashMap::new();
    for (name, value) in object {
        let number = match value {
            Value::Null => continue,
            Value::Bool(flag) => flag_to_number(flag),
            Value::Number(n) => n
                .as_f64()
                .with_context(|| format!("Metric '{}' is out of range", name))?,
            other => bail!("Metric '{}' must be a number or boolean, got {}", name, other),
        };
        metrics.insert(name, number);
    }
    Ok(metrics)
}

fn parse_metric_pair(pair: &str) -> Result<(String, f64)> {
    let Some((name, raw)) = pair.split_once('=') else {
        bail!("Expected name=value, got '{}'", pair);
    };
    let raw = raw.trim();
    let value = match raw {
        "true" => flag_to_number(true),
        "false" => flag_to_number(false),
        _ => raw
            .parse::<f64>()
            .with_context(|| format!("Metric '{}' has non-numeric value '{}'", name, raw))?,
    };
    Ok((name.trim().to_string(), value))
}

fn flag_to_number(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_pair() {
        assert_eq!(
            parse_metric_pair("seo_score=85").unwrap(),
            ("seo_score".to_string(), 85.0)
        );
        assert_eq!(
            parse_metric_pair(" meta_description_exists = true").unwrap(),
            ("meta_description_exists".to_string(), 1.0)
        );
        assert!(parse_metric_pair("seo_score").is_err());
        assert!(parse_metric_pair("seo_score=high").is_err());
    }

    #[test]
    fn test_parse_metrics_json() {
        let metrics = parse_metrics_json(
            r#"{"first_contentful_paint": 800, "meta_description_exists": false, "speed_index": null}"#,
        )
        .unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["first_contentful_paint"], 800.0);
        assert_eq!(metrics["meta_description_exists"], 0.0);

        assert!(parse_metrics_json("[1, 2]").is_err());
        assert!(parse_metrics_json(r#"{"seo_score": "85"}"#).is_err());
        assert!(parse_metrics_json("not json").is_err());
    }
}
