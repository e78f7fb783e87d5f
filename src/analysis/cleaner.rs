//! Raw dataset loading and cleaning.
//!
//! A dataset file is read into memory in one go, so rows appended by the
//! ingestion side while a job runs are not seen by that job. Cleaning
//! then drops unusable rows, keeps correct trials, derives block and
//! table from the trial number and clips outliers per table.

use crate::analysis::outliers::filter_outliers;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::models::CleanedTrial;
use crate::schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// A CSV file held in memory.
#[derive(Debug, Clone)]
pub struct RawDataset {
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl RawDataset {
    /// Read a dataset file as a snapshot.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::DatasetNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes).map_err(|e| AnalysisError::csv(path, e))
    }

    /// Parse CSV content. Short rows are accepted; their missing fields read as empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        Ok(Self { headers, rows })
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column, or `MissingColumn`.
    pub fn column(&self, name: &str) -> Result<usize, AnalysisError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
    }
}

/// Row counts collected while cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub invalid_response_time: usize,
    pub not_correct: usize,
    pub invalid_trial_number: usize,
    pub outliers_removed: usize,
    pub rows_retained: usize,
    /// Outliers removed per table id.
    pub outliers_by_table: BTreeMap<u32, usize>,
}

/// Output of the cleaning stage.
#[derive(Debug, Clone)]
pub struct CleanedDataset {
    /// Rows grouped by table, tables ascending.
    pub trials: Vec<CleanedTrial>,
    pub report: CleaningReport,
}

/// Column positions of the required fields.
struct Columns {
    participant: usize,
    layout_type: usize,
    result: usize,
    response_time: usize,
    trial_number: usize,
}

impl Columns {
    fn resolve(raw: &RawDataset) -> Result<Self, AnalysisError> {
        for name in schema::REQUIRED_COLUMNS {
            raw.column(name)?;
        }
        Ok(Self {
            participant: raw.column(schema::PARTICIPANT)?,
            layout_type: raw.column(schema::LAYOUT_TYPE)?,
            result: raw.column(schema::RESULT)?,
            response_time: raw.column(schema::RESPONSE_TIME)?,
            trial_number: raw.column(schema::TRIAL_NUMBER)?,
        })
    }
}

/// Parse a response time; only finite, non-negative values are usable.
pub fn parse_response_time(field: &str) -> Option<f64> {
    let value: f64 = field.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Parse a 1-based trial number. Integral floats such as `12.0` are accepted.
pub fn parse_trial_number(field: &str) -> Option<u32> {
    let field = field.trim();
    if let Ok(n) = field.parse::<u32>() {
        return (n > 0).then_some(n);
    }
    let value: f64 = field.parse().ok()?;
    if value.fract() == 0.0 && value >= 1.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Clean a raw dataset.
///
/// Fails with `MissingColumn` when a required column is absent. Rows whose
/// response time or trial number cannot be used are dropped and counted.
pub fn clean(raw: &RawDataset, config: &AnalysisConfig) -> Result<CleanedDataset, AnalysisError> {
    let columns = Columns::resolve(raw)?;
    let mut report = CleaningReport {
        rows_read: raw.len(),
        ..Default::default()
    };

    debug!("Dataset columns: {:?}", raw.headers());

    let field = |row: &csv::StringRecord, idx: usize| row.get(idx).unwrap_or("").to_string();

    let mut by_table: BTreeMap<u32, Vec<CleanedTrial>> = BTreeMap::new();

    for row in &raw.rows {
        let Some(response_time) = parse_response_time(row.get(columns.response_time).unwrap_or(""))
        else {
            report.invalid_response_time += 1;
            continue;
        };

        if row.get(columns.result) != Some(config.correct_label.as_str()) {
            report.not_correct += 1;
            continue;
        }

        let Some(trial_number) = parse_trial_number(row.get(columns.trial_number).unwrap_or(""))
        else {
            report.invalid_trial_number += 1;
            continue;
        };

        let (block, table) = schema::grouping_of(
            trial_number,
            config.trials_per_block,
            config.blocks_per_table,
        );

        by_table.entry(table).or_default().push(CleanedTrial {
            participant: field(row, columns.participant),
            layout_type: field(row, columns.layout_type),
            trial_number,
            block,
            table,
            response_time,
        });
    }

    info!(
        "Rows read: {}, usable response times: {}, correct: {}",
        report.rows_read,
        report.rows_read - report.invalid_response_time,
        report.rows_read - report.invalid_response_time - report.not_correct
    );
    if report.invalid_trial_number > 0 {
        info!(
            "Dropped {} rows with unusable trial numbers",
            report.invalid_trial_number
        );
    }

    let mut trials = Vec::new();
    for (table, group) in by_table {
        let filtered = filter_outliers(group, |t| t.response_time, config.outlier_sigma);
        if let Some(bounds) = filtered.bounds {
            debug!(
                "Table {}: mean {:.2}, sd {:.2}, band [{:.2}, {:.2}]",
                table, bounds.mean, bounds.std_dev, bounds.lower, bounds.upper
            );
        }
        info!("Table {}: removed {} outlier trials", table, filtered.removed);
        report.outliers_removed += filtered.removed;
        report.outliers_by_table.insert(table, filtered.removed);
        trials.extend(filtered.kept);
    }

    report.rows_retained = trials.len();
    info!("Rows after outlier removal: {}", report.rows_retained);

    Ok(CleanedDataset { trials, report })
}
