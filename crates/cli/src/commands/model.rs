//! Model release CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use grader_lib::artifact::{CLASSIFIER_FILE, EVALUATION_FILE, FEATURES_FILE, SCALER_FILE};
use grader_lib::ArtifactStore;
use serde_json::json;
use tabled::Tabled;

use super::train::print_evaluation;
use crate::output::{
    format_bytes, print_heading, print_json, print_table, print_warning, short_id, OutputFormat,
};

/// Row for release files table
#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "File")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
}

/// Row for releases table
#[derive(Tabled)]
struct ReleaseRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Published")]
    published: String,
    #[tabled(rename = "Current")]
    current: String,
}

/// Show the current release, its files, feature order and evaluation
pub fn show_model(store: &ArtifactStore, format: OutputFormat) -> Result<()> {
    let Some(version) = store.current_version()? else {
        match format {
            OutputFormat::Json => print_json(&json!({ "current": null, "releases": [] }))?,
            OutputFormat::Table => print_warning(&format!(
                "No model published in {}",
                store.root().display()
            )),
        }
        return Ok(());
    };

    let artifact = store
        .load()
        .with_context(|| format!("Published model {} is unusable", short_id(&version)))?;
    let report = store.load_report(&version)?;
    let releases = store.releases()?;
    let release_dir = store.release_dir(&version);

    let files: Vec<FileRow> = [CLASSIFIER_FILE, SCALER_FILE, FEATURES_FILE, EVALUATION_FILE]
        .iter()
        .filter_map(|name| {
            std::fs::metadata(release_dir.join(name))
                .ok()
                .map(|meta| FileRow {
                    name: name.to_string(),
                    size: format_bytes(meta.len()),
                })
        })
        .collect();

    let classes: Vec<&str> = artifact
        .classifier()
        .classes()
        .iter()
        .map(|c| c.as_str())
        .collect();
    let features = artifact.schema().names();

    match format {
        OutputFormat::Json => print_json(&json!({
            "current": version,
            "path": release_dir,
            "classes": classes,
            "trees": artifact.classifier().n_trees(),
            "features": features,
            "evaluation": report,
            "releases": releases,
        }))?,
        OutputFormat::Table => {
            print_heading("Model Release");
            println!("Version:                {}", version.cyan());
            println!("Path:                   {}", release_dir.display());
            println!("Trees:                  {}", artifact.classifier().n_trees());
            println!("Classes:                {}", classes.join(", "));
            println!("Feature order:          {}", features.join(", "));
            println!();

            print_table(files);

            match &report {
                Some(report) => {
                    println!(
                        "Trained at: {}",
                        report
                            .generated_at
                            .format("%Y-%m-%d %H:%M:%S UTC")
                            .to_string()
                            .dimmed()
                    );
                    print_evaluation(report);
                }
                None => print_warning("No evaluation report stored with this release"),
            }

            if releases.len() > 1 {
                println!();
                println!("{}", "Releases".bold());
                let rows: Vec<ReleaseRow> = releases
                    .iter()
                    .map(|r| ReleaseRow {
                        version: short_id(&r.version),
                        published: r
                            .published_at
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        current: if r.is_current { "yes".green().to_string() } else { String::new() },
                    })
                    .collect();
                print_table(rows);
            }
        }
    }

    Ok(())
}
