//! Dataset CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use grader_lib::dataset::{generate, load_csv, write_csv};
use grader_lib::{Dataset, PerformanceCategory, PipelineConfig, StructuredLogger};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    format_percent, print_heading, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for class distribution table
#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Share")]
    share: String,
}

fn class_rows(distribution: &BTreeMap<PerformanceCategory, usize>) -> Vec<ClassRow> {
    let total: usize = distribution.values().sum();
    PerformanceCategory::ALL
        .iter()
        .filter_map(|class| distribution.get(class).map(|count| (class, *count)))
        .map(|(class, count)| ClassRow {
            class: class.to_string(),
            rows: count,
            share: format_percent(count as f64 / total.max(1) as f64),
        })
        .collect()
}

/// Generate a dataset and write it as CSV
pub fn generate_dataset(config: &PipelineConfig, output: &Path, format: OutputFormat) -> Result<()> {
    let generator = config.generator_config();
    let dataset: Dataset = generate(&generator).context("Failed to generate dataset")?;
    write_csv(&dataset, output)
        .with_context(|| format!("Failed to write dataset to {}", output.display()))?;

    StructuredLogger::new("dataset").log_dataset_generated(
        &output.display().to_string(),
        dataset.len(),
        generator.mode.as_str(),
        generator.seed,
    );

    let distribution = dataset.class_distribution();
    match format {
        OutputFormat::Json => print_json(&json!({
            "path": output,
            "rows": dataset.len(),
            "mode": generator.mode,
            "seed": generator.seed,
            "class_distribution": distribution,
        }))?,
        OutputFormat::Table => {
            print_success(&format!(
                "Wrote {} rows to {}",
                dataset.len(),
                output.display().to_string().cyan()
            ));
            println!("Mode: {}  Seed: {}", generator.mode, generator.seed);
            print_table(class_rows(&distribution));
        }
    }

    Ok(())
}

/// Show row count, columns and class distribution of a dataset file
pub fn inspect_dataset(path: &Path, format: OutputFormat) -> Result<()> {
    let file = load_csv(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let distribution = file.dataset.class_distribution();
    let absent: Vec<&str> = file.absent_features().iter().map(|f| f.as_str()).collect();

    match format {
        OutputFormat::Json => print_json(&json!({
            "path": path,
            "rows": file.dataset.len(),
            "columns": file.columns,
            "ignored_columns": file.ignored_columns,
            "absent_features": absent,
            "class_distribution": distribution,
        }))?,
        OutputFormat::Table => {
            print_heading("Dataset Summary");
            println!("Path:      {}", path.display().to_string().cyan());
            println!("Rows:      {}", file.dataset.len());
            println!("Columns:   {}", file.columns.join(", "));
            println!();

            if !file.ignored_columns.is_empty() {
                print_info(&format!(
                    "Ignored columns: {}",
                    file.ignored_columns.join(", ")
                ));
            }
            if !absent.is_empty() {
                print_warning(&format!(
                    "Absent feature columns load as missing: {}",
                    absent.join(", ")
                ));
            }
            if distribution.len() < 2 {
                print_warning("Fewer than 2 classes present; this dataset cannot be trained on");
            }

            println!("{}", "Class Distribution".bold());
            print_table(class_rows(&distribution));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_rows_follow_category_order() {
        let mut distribution = BTreeMap::new();
        distribution.insert(PerformanceCategory::Poor, 1);
        distribution.insert(PerformanceCategory::Excellent, 3);

        let rows = class_rows(&distribution);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class, "Poor");
        assert_eq!(rows[0].share, "25.0%");
        assert_eq!(rows[1].class, "Excellent");
        assert_eq!(rows[1].rows, 3);
    }
}
