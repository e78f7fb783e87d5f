//! Data directory scanner.
//!
//! Lists the datasets available for analysis and the artifacts already
//! written, the way an operator would browse the data folder.

use crate::config::DatasetConfig;
use crate::report::generator::ARTIFACT_PREFIXES;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a scanned file is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileKind {
    /// The population-wide trial file.
    Population,
    /// One participant's trial file.
    Participant { participant: String },
    /// A table or chart produced by an analysis run.
    Artifact,
    /// Any other CSV in the data directory.
    Other,
}

/// Scanned file information.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedFile {
    /// File name inside the scanned directory
    pub name: String,
    /// File size in bytes
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: FileKind,
}

/// Scanner over the data and output directories.
pub struct DataScanner {
    data_dir: PathBuf,
    output_dir: PathBuf,
    dataset: DatasetConfig,
}

impl DataScanner {
    /// Create a new scanner.
    pub fn new(data_dir: PathBuf, output_dir: PathBuf, dataset: DatasetConfig) -> Self {
        Self {
            data_dir,
            output_dir,
            dataset,
        }
    }

    /// Trial CSV files in the data directory, sorted by name.
    pub fn datasets(&self) -> Result<Vec<ScannedFile>> {
        let files = self.list(&self.data_dir, &["csv"])?;
        Ok(files
            .into_iter()
            .filter(|f| f.kind != FileKind::Artifact)
            .collect())
    }

    /// Artifacts in the output directory, sorted by name.
    pub fn artifacts(&self) -> Result<Vec<ScannedFile>> {
        let files = self.list(&self.output_dir, &["csv", "svg"])?;
        Ok(files
            .into_iter()
            .filter(|f| f.kind == FileKind::Artifact)
            .collect())
    }

    /// Classify a file name.
    pub fn classify(&self, name: &str) -> FileKind {
        if ARTIFACT_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return FileKind::Artifact;
        }
        if name == self.dataset.population_file {
            return FileKind::Population;
        }

        let stem = name.strip_suffix(".csv").unwrap_or(name);
        match stem.strip_suffix(&self.dataset.participant_suffix) {
            Some(participant) if !participant.is_empty() => FileKind::Participant {
                participant: participant.to_string(),
            },
            _ => FileKind::Other,
        }
    }

    /// Check if a name should be skipped.
    fn is_excluded(name: &str) -> bool {
        // Hidden and temporary files
        name.starts_with('.')
    }

    /// List regular files of `dir` with one of `extensions`. A missing
    /// directory lists as empty.
    fn list(&self, dir: &Path, extensions: &[&str]) -> Result<Vec<ScannedFile>> {
        if !dir.is_dir() {
            debug!("Directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if Self::is_excluded(&name) || !path.is_file() {
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !extensions.contains(&ext) {
                continue;
            }

            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };

            files.push(ScannedFile {
                kind: self.classify(&name),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                name,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner(dir: &Path) -> DataScanner {
        DataScanner::new(
            dir.to_path_buf(),
            dir.join("out"),
            DatasetConfig::default(),
        )
    }

    #[test]
    fn test_classify() {
        let dir = TempDir::new().unwrap();
        let s = scanner(dir.path());
        assert_eq!(s.classify("Implic_Learning_results.csv"), FileKind::Population);
        assert_eq!(
            s.classify("P1_results.csv"),
            FileKind::Participant {
                participant: "P1".to_string()
            }
        );
        assert_eq!(
            s.classify("experiment_anova_statistics_P1.csv"),
            FileKind::Artifact
        );
        assert_eq!(s.classify("notes.csv"), FileKind::Other);
        assert_eq!(s.classify("_results.csv"), FileKind::Other);
    }

    #[test]
    fn test_lists_datasets_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        fs::write(dir.path().join("P2_results.csv"), "a\n").unwrap();
        fs::write(dir.path().join("Implic_Learning_results.csv"), "a\n").unwrap();
        fs::write(dir.path().join(".tmpXYZ.csv"), "a\n").unwrap();
        fs::write(dir.path().join("readme.txt"), "a\n").unwrap();
        fs::write(out.join("average_reaction_time_pointplot.svg"), "<svg/>").unwrap();
        fs::write(out.join("mean_response_time_sorted_by_participant.csv"), "x\n").unwrap();

        let s = scanner(dir.path());
        let names: Vec<String> = s.datasets().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Implic_Learning_results.csv", "P2_results.csv"]);

        let artifacts = s.artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "average_reaction_time_pointplot.svg");
        assert_eq!(artifacts[0].size, 6);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let s = scanner(&dir.path().join("nope"));
        assert!(s.datasets().unwrap().is_empty());
        assert!(s.artifacts().unwrap().is_empty());
    }
}
