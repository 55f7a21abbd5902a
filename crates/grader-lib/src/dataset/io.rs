//! CSV persistence for labeled datasets
//!
//! Files carry one column per record field followed by the label column.
//! Readers are lenient about extra columns and empty cells but strict about
//! the label column and malformed rows.

use crate::error::{GradeError, Result};
use crate::models::{Dataset, Feature, LabeledRecord, MetricRecord, PerformanceCategory, LABEL_COLUMN};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Column header written by [`write_csv`]
pub fn csv_header() -> Vec<&'static str> {
    Feature::ALL
        .iter()
        .map(|f| f.as_str())
        .chain(std::iter::once(LABEL_COLUMN))
        .collect()
}

/// Write a dataset, replacing any existing file atomically
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| GradeError::io(parent, e))?;
    }

    let temp_path = path.with_extension("csv.tmp");
    let result = write_rows(dataset, &temp_path).and_then(|_| {
        fs::rename(&temp_path, path).map_err(|e| GradeError::io(path, e))
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    info!(path = %path.display(), rows = dataset.len(), "Dataset written");
    Ok(())
}

fn write_rows(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| GradeError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let io_err = |e| GradeError::io(path, e);

    writeln!(writer, "{}", csv_header().join(",")).map_err(io_err)?;
    for row in dataset.rows() {
        let mut cells: Vec<String> = Feature::ALL
            .iter()
            .map(|f| row.record.get(*f).map(format_value).unwrap_or_default())
            .collect();
        cells.push(escape(row.label.as_str()));
        writeln!(writer, "{}", cells.join(",")).map_err(io_err)?;
    }

    let file = writer.into_inner().map_err(|e| GradeError::io(path, e.into_error()))?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// A dataset read from disk together with its column layout
#[derive(Debug, Clone)]
pub struct DatasetFile {
    pub dataset: Dataset,
    /// Header columns in file order
    pub columns: Vec<String>,
    /// Columns that are neither a record field nor the label
    pub ignored_columns: Vec<String>,
}

impl DatasetFile {
    /// Record fields the file does not provide at all
    pub fn absent_features(&self) -> Vec<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .filter(|f| !self.columns.iter().any(|c| c.trim() == f.as_str()))
            .collect()
    }
}

/// Read a labeled dataset
pub fn read_csv(path: &Path) -> Result<Dataset> {
    load_csv(path).map(|file| file.dataset)
}

/// Read a labeled dataset and keep the header information
pub fn load_csv(path: &Path) -> Result<DatasetFile> {
    let file = File::open(path).map_err(|e| GradeError::io(path, e))?;
    let loaded = parse_csv(BufReader::new(file), path)?;
    info!(
        path = %path.display(),
        rows = loaded.dataset.len(),
        ignored_columns = loaded.ignored_columns.len(),
        "Dataset loaded"
    );
    Ok(loaded)
}

fn parse_csv<R: BufRead>(reader: R, path: &Path) -> Result<DatasetFile> {
    let mut lines = reader.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line.map_err(|e| GradeError::io(path, e))?;
                if !line.trim().is_empty() {
                    break split_line(&line, 1)?;
                }
            }
            None => {
                return Err(GradeError::DataIntegrity(format!(
                    "{} is empty",
                    path.display()
                )))
            }
        }
    };
    let header: Vec<String> = header
        .into_iter()
        .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let label_idx = header.iter().position(|c| c == LABEL_COLUMN).ok_or_else(|| {
        GradeError::DataIntegrity(format!(
            "{} has no '{}' column",
            path.display(),
            LABEL_COLUMN
        ))
    })?;

    let mut columns: Vec<(usize, Feature)> = Vec::new();
    let mut ignored = Vec::new();
    for (i, name) in header.iter().enumerate() {
        if i == label_idx {
            continue;
        }
        match name.parse::<Feature>() {
            Ok(feature) => columns.push((i, feature)),
            Err(_) => {
                debug!(column = %name, "Ignoring unknown dataset column");
                ignored.push(name.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let line = line.map_err(|e| GradeError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_line(&line, line_no)?;
        if cells.len() != header.len() {
            return Err(GradeError::DataIntegrity(format!(
                "line {}: expected {} cells, found {}",
                line_no,
                header.len(),
                cells.len()
            )));
        }

        let label: PerformanceCategory = cells[label_idx]
            .parse()
            .map_err(|e| GradeError::DataIntegrity(format!("line {}: {}", line_no, e)))?;

        let mut record = MetricRecord::default();
        for &(i, feature) in &columns {
            let cell = cells[i].trim();
            if cell.is_empty() {
                continue;
            }
            let value = parse_cell(cell, feature).ok_or_else(|| {
                GradeError::DataIntegrity(format!(
                    "line {}: invalid value '{}' for {}",
                    line_no, cell, feature
                ))
            })?;
            record
                .set(feature, value)
                .map_err(|e| GradeError::DataIntegrity(format!("line {}: {}", line_no, e)))?;
        }
        rows.push(LabeledRecord { record, label });
    }

    Ok(DatasetFile {
        dataset: Dataset::new(rows),
        columns: header,
        ignored_columns: ignored,
    })
}

fn parse_cell(cell: &str, feature: Feature) -> Option<f64> {
    if feature.is_flag() {
        match cell.to_ascii_lowercase().as_str() {
            "true" => return Some(1.0),
            "false" => return Some(0.0),
            _ => {}
        }
    }
    cell.parse::<f64>().ok()
}

/// Split one CSV line, honoring double-quoted cells
fn split_line(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.trim().is_empty() => {
                current.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err(GradeError::DataIntegrity(format!(
            "line {}: unterminated quoted cell",
            line_no
        )));
    }
    cells.push(current);
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<DatasetFile> {
        parse_csv(text.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(split_line("a,b,c", 1).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            split_line("\"x, y\",\"say \"\"hi\"\"\",", 1).unwrap(),
            vec!["x, y", "say \"hi\"", ""]
        );
        assert!(split_line("\"open,1", 4).is_err());
    }

    #[test]
    fn test_extra_columns_and_empty_cells() {
        let text = "url,first_contentful_paint,seo_score,meta_description_exists,performance_category\n\
                    https://a.example,800,,1,Good\n\
                    \n\
                    https://b.example,3900,41.5,False,Poor\n";
        let file = parse(text).unwrap();
        assert_eq!(file.dataset.len(), 2);
        assert_eq!(file.ignored_columns, vec!["url"]);

        let first = &file.dataset.rows()[0];
        assert_eq!(first.label, PerformanceCategory::Good);
        assert_eq!(first.record.first_contentful_paint, Some(800.0));
        assert_eq!(first.record.seo_score, None);
        assert_eq!(first.record.meta_description_exists, Some(true));
        assert_eq!(file.dataset.rows()[1].record.meta_description_exists, Some(false));
        assert!(file.absent_features().contains(&Feature::SpeedIndex));
    }

    #[test]
    fn test_missing_label_column() {
        let err = parse("first_contentful_paint,seo_score\n800,90\n").unwrap_err();
        assert!(matches!(err, GradeError::DataIntegrity(_)));
        assert!(err.to_string().contains(LABEL_COLUMN));
    }

    #[test]
    fn test_malformed_rows_report_line() {
        let short = parse("seo_score,performance_category\n90,Good\n80\n").unwrap_err();
        assert!(short.to_string().contains("line 3"));

        let bad_number = parse("seo_score,performance_category\nninety,Good\n").unwrap_err();
        assert!(bad_number.to_string().contains("line 2"));

        let bad_label = parse("seo_score,performance_category\n90,Average\n").unwrap_err();
        assert!(matches!(bad_label, GradeError::DataIntegrity(_)));
    }

    #[test]
    fn test_header_lists_every_field_then_label() {
        let header = csv_header();
        assert_eq!(header.len(), Feature::ALL.len() + 1);
        assert_eq!(header[0], "first_contentful_paint");
        assert_eq!(header.last(), Some(&LABEL_COLUMN));
    }
}
