//! Training CLI command

use anyhow::{Context, Result};
use colored::Colorize;
use grader_lib::dataset::read_csv;
use grader_lib::training::EvaluationReport;
use grader_lib::{PipelineConfig, Trainer};
use serde_json::json;
use tabled::Tabled;
use tracing::info;

use crate::output::{
    color_confidence, format_percent, print_heading, print_info, print_json, print_success,
    print_table, print_warning, short_id, OutputFormat,
};

/// Number of features listed in the importance table
const TOP_FEATURES: usize = 5;

/// Row for per-class metrics table
#[derive(Tabled)]
struct ClassMetricsRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Support")]
    support: usize,
}

/// Row for feature importance table
#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

/// Train on the configured dataset and publish the model release
pub fn train_model(
    config: &PipelineConfig,
    keep_releases: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let path = config.require_dataset_path()?;
    let dataset =
        read_csv(path).with_context(|| format!("Failed to read dataset {}", path.display()))?;
    info!(rows = dataset.len(), path = %path.display(), "Dataset loaded");

    let trainer = Trainer::new(config.trainer_config()?)?;
    let outcome = trainer.train(&dataset).context("Training failed")?;

    let store = config.store();
    let release = store
        .save_with_report(&outcome.artifact, Some(&outcome.report))
        .with_context(|| format!("Failed to publish model to {}", store.root().display()))?;

    let pruned = match keep_releases {
        Some(keep) => store
            .prune_releases(keep)
            .context("Failed to prune old releases")?,
        None => Vec::new(),
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "version": outcome.artifact.version(),
            "release": release,
            "train_rows": outcome.train_rows,
            "duration_secs": outcome.duration.as_secs_f64(),
            "balance": outcome.balance,
            "warnings": outcome.warnings,
            "evaluation": outcome.report,
            "pruned": pruned,
        }))?,
        OutputFormat::Table => {
            print_success(&format!(
                "Published model {} to {}",
                short_id(outcome.artifact.version()).cyan(),
                release.display()
            ));
            println!();

            print_heading("Training Summary");
            println!("Training rows:          {}", outcome.train_rows);
            if let Some(balance) = &outcome.balance {
                println!("Synthetic samples:      {}", balance.total_synthesized());
            }
            println!("Held-out rows:          {}", outcome.report.held_out);
            println!("Duration:               {:.2}s", outcome.duration.as_secs_f64());
            println!();

            for warning in &outcome.warnings {
                print_warning(&warning.to_string());
            }
            print_evaluation(&outcome.report);

            if !pruned.is_empty() {
                println!();
                print_info(&format!("Pruned {} old release(s)", pruned.len()));
            }
        }
    }

    Ok(())
}

/// Print accuracy, per-class metrics and top features of a report
pub fn print_evaluation(report: &EvaluationReport) {
    println!(
        "{} {} on {} held-out rows",
        "Accuracy:".bold(),
        color_confidence(report.accuracy),
        report.held_out
    );

    let rows: Vec<ClassMetricsRow> = report
        .per_class
        .iter()
        .map(|(class, m)| ClassMetricsRow {
            class: class.to_string(),
            precision: format!("{:.2}", m.precision),
            recall: format!("{:.2}", m.recall),
            f1: format!("{:.2}", m.f1),
            support: m.support,
        })
        .chain([
            ClassMetricsRow {
                class: "macro avg".to_string(),
                precision: format!("{:.2}", report.macro_avg.precision),
                recall: format!("{:.2}", report.macro_avg.recall),
                f1: format!("{:.2}", report.macro_avg.f1),
                support: report.held_out,
            },
            ClassMetricsRow {
                class: "weighted avg".to_string(),
                precision: format!("{:.2}", report.weighted_avg.precision),
                recall: format!("{:.2}", report.weighted_avg.recall),
                f1: format!("{:.2}", report.weighted_avg.f1),
                support: report.held_out,
            },
        ])
        .collect();
    print_table(rows);

    println!("{}", "Top Features".bold());
    let features: Vec<ImportanceRow> = report
        .feature_importance
        .iter()
        .take(TOP_FEATURES)
        .map(|f| ImportanceRow {
            feature: f.feature.clone(),
            importance: format_percent(f.importance),
        })
        .collect();
    print_table(features);
}
