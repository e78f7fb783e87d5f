//! Trial ingestion.
//!
//! Appends a batch of submitted trials to the population dataset and to
//! the participant's own dataset, using the shared column schema.

use crate::config::DatasetConfig;
use crate::models::{DatasetName, TrialRecord};
use crate::schema;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Trials submitted by the experiment front-end for one participant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialBatch {
    pub participant: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub test_type: String,
    #[serde(default)]
    pub results: Vec<TrialSubmission>,
}

/// One submitted trial.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSubmission {
    pub trial_number: u32,
    /// Sent as a number or a string depending on the front-end version.
    #[serde(default)]
    pub layout_id: serde_json::Value,
    #[serde(default)]
    pub layout_type: String,
    #[serde(default)]
    pub result: String,
    #[serde(default, alias = "responseTime(ms)")]
    pub response_time: Option<f64>,
}

impl TrialBatch {
    /// Parse a JSON batch.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse trial batch")
    }

    /// Rows to append, in submission order.
    pub fn records(&self) -> Vec<TrialRecord> {
        self.results
            .iter()
            .map(|r| TrialRecord {
                participant: self.participant.clone(),
                condition: self.condition.clone(),
                test_type: self.test_type.clone(),
                trial_number: r.trial_number,
                layout_id: scalar_text(&r.layout_id),
                layout_type: r.layout_type.clone(),
                result: r.result.clone(),
                response_time: r.response_time,
            })
            .collect()
    }
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Where a batch was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendSummary {
    pub rows: usize,
    pub population_file: PathBuf,
    pub participant_file: PathBuf,
}

/// Append `batch` to the population file and the participant's file in
/// `data_dir`. The header is written only to a new or empty file.
pub fn append_batch(data_dir: &Path, config: &DatasetConfig, batch: &TrialBatch) -> Result<AppendSummary> {
    if batch.participant.trim().is_empty() {
        bail!("Trial batch has no participant");
    }

    let participant = DatasetName::for_participant(batch.participant.trim(), config)
        .with_context(|| format!("Invalid participant id '{}'", batch.participant))?;
    let population = DatasetName::population(config);

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let records = batch.records();
    let population_file = append_records(&population.path_in(data_dir), &records)?;
    let participant_file = append_records(&participant.path_in(data_dir), &records)?;

    info!(
        "Appended {} trials for {} to {} and {}",
        records.len(),
        batch.participant,
        population,
        participant
    );

    Ok(AppendSummary {
        rows: records.len(),
        population_file,
        participant_file,
    })
}

/// Append rows in a single write.
fn append_records(path: &Path, records: &[TrialRecord]) -> Result<PathBuf> {
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let mut writer = csv::Writer::from_writer(Vec::new());
    if needs_header {
        writer.write_record(schema::CANONICAL_COLUMNS)?;
        debug!("Writing header to {}", path.display());
    }
    for record in records {
        writer.write_record(record.to_fields())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to encode rows: {}", e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("Failed to append to {}", path.display()))?;

    Ok(path.to_path_buf())
}
