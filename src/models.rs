//! Data models for the trial analysis.
//!
//! This module contains the core data structures passed between the
//! pipeline stages: trial rows, cleaned rows, aggregate rows, the ANOVA
//! table and dataset names.

use crate::config::DatasetConfig;
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One trial as submitted by the experiment front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub participant: String,
    pub condition: String,
    pub test_type: String,
    pub trial_number: u32,
    pub layout_id: String,
    pub layout_type: String,
    pub result: String,
    /// Response time in milliseconds; absent when the front-end recorded none.
    pub response_time: Option<f64>,
}

impl TrialRecord {
    /// Field values in canonical column order.
    pub fn to_fields(&self) -> [String; 8] {
        [
            self.participant.clone(),
            self.condition.clone(),
            self.test_type.clone(),
            self.trial_number.to_string(),
            self.layout_id.clone(),
            self.layout_type.clone(),
            self.result.clone(),
            self.response_time.map(|rt| rt.to_string()).unwrap_or_default(),
        ]
    }
}

/// A correct trial that survived cleaning, with its derived grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTrial {
    pub participant: String,
    pub layout_type: String,
    pub trial_number: u32,
    /// `ceil(trial_number / trials_per_block)`.
    pub block: u32,
    /// `ceil(block / blocks_per_table)`.
    pub table: u32,
    pub response_time: f64,
}

/// Mean response time of one (participant, layout type, table) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub participant: String,
    pub layout_type: String,
    pub table: u32,
    pub mean_response_time: f64,
}

/// One line of the ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaRow {
    /// Source of variation (`layoutType`, `Table`, `layoutType:Table`, `Residual`).
    pub source: String,
    pub sum_sq: f64,
    pub df: u32,
    /// F statistic. Absent for the residual row and when it is undefined.
    pub f_value: Option<f64>,
    /// Upper-tail probability of `f_value`.
    pub p_value: Option<f64>,
}

/// Type-II two-factor ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaTable {
    pub rows: Vec<AnovaRow>,
    /// Number of aggregate rows the model was fitted on.
    pub observations: usize,
}

#[cfg(test)]
impl AnovaTable {
    /// Look up a row by source name.
    pub fn row(&self, source: &str) -> Option<&AnovaRow> {
        self.rows.iter().find(|r| r.source == source)
    }
}

/// A dataset addressed by name: the population file or one participant's file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatasetName {
    /// All participants, stored under the configured population file name.
    Population { file_name: String },
    /// A single participant, stored as `{participant}{suffix}.csv`.
    Participant { participant: String, file_name: String },
}

impl DatasetName {
    /// Resolve a raw dataset name.
    ///
    /// Accepts the population file name (with or without `.csv`), a
    /// participant file name (`P1_results.csv`, `P1_results`) or a bare
    /// participant id (`P1`).
    pub fn parse(raw: &str, config: &DatasetConfig) -> Result<Self, AnalysisError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AnalysisError::InvalidDataset("empty name".to_string()));
        }
        if raw.contains('/') || raw.contains('\\') || raw.contains("..") {
            return Err(AnalysisError::InvalidDataset(format!(
                "'{}' must be a plain file name",
                raw
            )));
        }

        let stem = raw.strip_suffix(".csv").unwrap_or(raw);
        let population_stem = config
            .population_file
            .strip_suffix(".csv")
            .unwrap_or(&config.population_file);

        if stem == population_stem {
            return Ok(DatasetName::Population {
                file_name: config.population_file.clone(),
            });
        }

        let participant = stem.strip_suffix(&config.participant_suffix).unwrap_or(stem);
        if participant.is_empty() {
            return Err(AnalysisError::InvalidDataset(format!(
                "'{}' has no participant id",
                raw
            )));
        }

        Ok(DatasetName::Participant {
            participant: participant.to_string(),
            file_name: format!("{}{}.csv", participant, config.participant_suffix),
        })
    }

    /// The dataset of one participant.
    pub fn for_participant(participant: &str, config: &DatasetConfig) -> Result<Self, AnalysisError> {
        Self::parse(&format!("{}{}", participant, config.participant_suffix), config)
    }

    /// The population dataset.
    pub fn population(config: &DatasetConfig) -> Self {
        DatasetName::Population {
            file_name: config.population_file.clone(),
        }
    }

    /// File name inside the data directory.
    pub fn file_name(&self) -> &str {
        match self {
            DatasetName::Population { file_name } => file_name,
            DatasetName::Participant { file_name, .. } => file_name,
        }
    }

    /// Participant id in single-participant mode.
    pub fn participant(&self) -> Option<&str> {
        match self {
            DatasetName::Population { .. } => None,
            DatasetName::Participant { participant, .. } => Some(participant),
        }
    }

    /// Full path of the dataset file.
    pub fn path_in(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.file_name())
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}
