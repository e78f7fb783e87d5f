//! The per-job stage runner.
//!
//! Stages run strictly in order on the calling thread:
//! Cleaner, Aggregator, Tester, Writer. Each stage consumes the whole
//! output of the previous one.

use crate::analysis::aggregator::{aggregate_means, filter_participant};
use crate::analysis::anova::{two_way_anova, TestOutcome, TestScope};
use crate::analysis::cleaner::{clean, RawDataset};
use crate::config::{AnalysisConfig, Config, DatasetConfig};
use crate::error::AnalysisError;
use crate::jobs::job::JobOutcome;
use crate::models::DatasetName;
use crate::report::ReportWriter;
use std::path::PathBuf;
use tracing::{debug, info};

/// Runs one dataset through the analysis. Called from worker threads.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, dataset: &str) -> Result<JobOutcome, AnalysisError>;
}

/// The analysis pipeline over a data directory.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    data_dir: PathBuf,
    dataset: DatasetConfig,
    analysis: AnalysisConfig,
    writer: ReportWriter,
}

impl AnalysisPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            data_dir: config.general.data_dir.clone(),
            dataset: config.dataset.clone(),
            analysis: config.analysis.clone(),
            writer: ReportWriter::new(config.general.effective_output_dir(), &config.report),
        }
    }

    /// Run every stage on `dataset`.
    ///
    /// A participant dataset is tested on that participant's rows only.
    pub fn run_dataset(&self, dataset: &str) -> Result<JobOutcome, AnalysisError> {
        let name = DatasetName::parse(dataset, &self.dataset)?;
        let path = name.path_in(&self.data_dir);
        info!("Analyzing {}", path.display());

        let raw = RawDataset::load(&path)?;
        let cleaned = clean(&raw, &self.analysis)?;

        let participant = name.participant();
        let rows = match participant {
            Some(p) => filter_participant(&aggregate_means(&cleaned.trials), p),
            None => aggregate_means(&cleaned.trials),
        };
        debug!("{} aggregate rows in scope", rows.len());

        let scope = participant.map_or(TestScope::Population, TestScope::Participant);
        let table = match two_way_anova(&rows, scope)? {
            TestOutcome::Table(table) => table,
            TestOutcome::NoResult { reason } => {
                info!("No result for {}: {}", name, reason);
                return Ok(JobOutcome::NoResult {
                    reason,
                    cleaning: cleaned.report,
                });
            }
        };

        let artifacts = self.writer.write_all(&rows, &table, participant)?;
        info!(
            "Finished {}: {} artifacts written",
            name,
            artifacts.paths().len()
        );

        Ok(JobOutcome::Completed {
            artifacts,
            cleaning: cleaned.report,
        })
    }
}

impl JobRunner for AnalysisPipeline {
    fn run(&self, dataset: &str) -> Result<JobOutcome, AnalysisError> {
        self.run_dataset(dataset)
    }
}
