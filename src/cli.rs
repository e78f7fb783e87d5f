//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TrialScope - reaction-time analysis for layout learning experiments
///
/// Cleans trial CSVs, aggregates mean response times per participant,
/// layout type and table, runs a two-way ANOVA and writes tables and
/// charts next to the data.
///
/// Examples:
///   trialscope analyze Implic_Learning_results.csv
///   trialscope analyze P1 P2 P3 --workers 3
///   trialscope ingest batch.json
///   trialscope list
///   trialscope init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .trialscope.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the trial CSV files
    #[arg(long, value_name = "DIR", global = true, env = "TRIALSCOPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory receiving tables and charts (defaults to the data directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Number of analysis workers
    #[arg(long, value_name = "NUM", global = true)]
    pub workers: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Analyze one or more datasets
    ///
    /// A dataset is the population file name, a participant file name
    /// (P1_results.csv) or a bare participant id (P1).
    Analyze {
        /// Datasets to analyze
        #[arg(required = true, value_name = "DATASET")]
        datasets: Vec<String>,

        /// Print job results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Append a JSON batch of trials to the data directory
    Ingest {
        /// Batch file produced by the experiment front-end
        #[arg(value_name = "BATCH")]
        batch: PathBuf,
    },

    /// List datasets and generated artifacts
    List,

    /// Generate a default .trialscope.toml configuration file
    InitConfig,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".to_string());
        }

        if let Some(ref data_dir) = self.data_dir {
            if data_dir.exists() && !data_dir.is_dir() {
                return Err(format!(
                    "Data path is not a directory: {}",
                    data_dir.display()
                ));
            }
        }

        match &self.command {
            Command::Analyze { datasets, .. } => {
                if datasets.iter().any(|d| d.trim().is_empty()) {
                    return Err("Dataset names must not be empty".to_string());
                }
            }
            Command::Ingest { batch } => {
                if !batch.is_file() {
                    return Err(format!("Batch file does not exist: {}", batch.display()));
                }
            }
            Command::List | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over both `--verbose` and `verbose` in the config file.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command,
            config: None,
            data_dir: None,
            output_dir: None,
            workers: None,
            verbose: false,
            quiet: false,
        }
    }

    fn analyze(datasets: &[&str]) -> Command {
        Command::Analyze {
            datasets: datasets.iter().map(|d| d.to_string()).collect(),
            json: false,
        }
    }

    #[test]
    fn test_parse_analyze() {
        let args = Args::try_parse_from([
            "trialscope",
            "analyze",
            "P1",
            "P2",
            "--workers",
            "3",
            "--json",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Analyze {
                datasets: vec!["P1".to_string(), "P2".to_string()],
                json: true,
            }
        );
        assert_eq!(args.workers, Some(3));
    }

    #[test]
    fn test_analyze_requires_dataset() {
        assert!(Args::try_parse_from(["trialscope", "analyze"]).is_err());
    }

    #[test]
    fn test_global_flags_before_subcommand() {
        let args =
            Args::try_parse_from(["trialscope", "--data-dir", "/tmp/d", "-v", "list"]).unwrap();
        assert_eq!(args.command, Command::List);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/d")));
        assert!(args.verbose);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(analyze(&["P1"]));
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_workers() {
        let mut args = make_args(analyze(&["P1"]));
        assert!(args.validate().is_ok());
        args.workers = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_blank_dataset() {
        let args = make_args(analyze(&["P1", "  "]));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_batch() {
        let args = make_args(Command::Ingest {
            batch: PathBuf::from("/definitely/not/here.json"),
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::List);
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_sets_debug_unless_quiet() {
        let config: crate::config::Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let mut args = make_args(Command::List);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::ERROR);

        let plain_file: crate::config::Config = toml::from_str("[general]\nverbose = false\n").unwrap();
        args.quiet = false;
        assert_eq!(args.log_level(plain_file.general.verbose), tracing::Level::INFO);
    }
}
