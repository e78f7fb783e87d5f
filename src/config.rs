//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.trialscope.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".trialscope.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dataset naming settings.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Analysis parameters.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the raw trial CSV files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory receiving artifacts. Defaults to `data_dir`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of pipeline workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often the CLI polls job status, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: None,
            verbose: false,
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl GeneralConfig {
    /// Directory artifacts are written to.
    pub fn effective_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone())
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    200
}

/// Dataset file naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// File name of the population-wide dataset.
    #[serde(default = "default_population_file")]
    pub population_file: String,

    /// Suffix appended to a participant id to form its dataset stem.
    #[serde(default = "default_participant_suffix")]
    pub participant_suffix: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            population_file: default_population_file(),
            participant_suffix: default_participant_suffix(),
        }
    }
}

fn default_population_file() -> String {
    "Implic_Learning_results.csv".to_string()
}

fn default_participant_suffix() -> String {
    "_results".to_string()
}

/// Parameters of the cleaning and grouping stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Trials per block.
    #[serde(default = "default_trials_per_block")]
    pub trials_per_block: u32,

    /// Blocks per table.
    #[serde(default = "default_blocks_per_table")]
    pub blocks_per_table: u32,

    /// Width of the retained band, in sample standard deviations.
    #[serde(default = "default_outlier_sigma")]
    pub outlier_sigma: f64,

    /// Value of the `result` column that marks a correct trial.
    #[serde(default = "default_correct_label")]
    pub correct_label: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trials_per_block: default_trials_per_block(),
            blocks_per_table: default_blocks_per_table(),
            outlier_sigma: default_outlier_sigma(),
            correct_label: default_correct_label(),
        }
    }
}

fn default_trials_per_block() -> u32 {
    20
}

fn default_blocks_per_table() -> u32 {
    3
}

fn default_outlier_sigma() -> f64 {
    3.0
}

fn default_correct_label() -> String {
    "Correct".to_string()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Render the SVG chart artifacts.
    #[serde(default = "default_true")]
    pub charts: bool,

    /// Chart width in pixels.
    #[serde(default = "default_chart_width")]
    pub chart_width: u32,

    /// Chart height in pixels.
    #[serde(default = "default_chart_height")]
    pub chart_height: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            charts: true,
            chart_width: default_chart_width(),
            chart_height: default_chart_height(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chart_width() -> u32 {
    800
}

fn default_chart_height() -> u32 {
    480
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(ref output_dir) = args.output_dir {
            self.general.output_dir = Some(output_dir.clone());
        }
        if let Some(workers) = args.workers {
            self.general.workers = workers;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.data_dir, PathBuf::from("data"));
        assert_eq!(config.general.workers, 2);
        assert_eq!(config.dataset.population_file, "Implic_Learning_results.csv");
        assert_eq!(config.analysis.trials_per_block, 20);
        assert_eq!(config.analysis.blocks_per_table, 3);
        assert_eq!(config.analysis.outlier_sigma, 3.0);
        assert!(config.report.charts);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data_dir = "/srv/experiment"
output_dir = "/srv/reports"
workers = 4

[analysis]
outlier_sigma = 2.5

[report]
charts = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data_dir, PathBuf::from("/srv/experiment"));
        assert_eq!(
            config.general.effective_output_dir(),
            PathBuf::from("/srv/reports")
        );
        assert_eq!(config.general.workers, 4);
        assert_eq!(config.analysis.outlier_sigma, 2.5);
        assert_eq!(config.analysis.correct_label, "Correct");
        assert!(!config.report.charts);
        assert_eq!(config.dataset.participant_suffix, "_results");
    }

    #[test]
    fn test_output_dir_defaults_to_data_dir() {
        let config = Config::default();
        assert_eq!(config.general.effective_output_dir(), PathBuf::from("data"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[dataset]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.analysis.trials_per_block, 20);
    }
}
