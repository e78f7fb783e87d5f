//! Error taxonomy for the analysis pipeline.
//!
//! Every stage returns `AnalysisError`; the job orchestrator converts it
//! into a failed job with a readable reason. An empty filtered input is
//! not an error, see `TestOutcome::NoResult`.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required column is absent from the dataset.
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// The linear model cannot be fitted (a factor has fewer than two levels).
    #[error("singular model: {0}")]
    SingularModel(String),

    /// The dataset file does not exist.
    #[error("dataset not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    /// The dataset name cannot be mapped to a file.
    #[error("invalid dataset name: {0}")]
    InvalidDataset(String),

    /// Reading or writing a file failed.
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected a file.
    #[error("CSV failure on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl AnalysisError {
    /// Build an `Io` error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a `Csv` error for `path`.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        AnalysisError::Csv {
            path: path.into(),
            source,
        }
    }

    /// Stable label used in job status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::MissingColumn(_) => "missing_column",
            AnalysisError::SingularModel(_) => "singular_model",
            AnalysisError::DatasetNotFound(_) => "dataset_not_found",
            AnalysisError::InvalidDataset(_) => "invalid_dataset",
            AnalysisError::Io { .. } | AnalysisError::Csv { .. } => "io_failure",
        }
    }
}
