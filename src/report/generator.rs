//! Artifact generation.
//!
//! This module renders the aggregate and ANOVA tables as CSV, draws the
//! charts and persists each artifact to the output directory.

use crate::analysis::aggregator::filter_participant;
use crate::config::ReportConfig;
use crate::error::AnalysisError;
use crate::models::{AggregateRow, AnovaTable};
use crate::report::charts::{self, ChartStyle};
use crate::schema;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File name prefixes shared by every artifact the writer produces.
pub const ARTIFACT_PREFIXES: [&str; 3] = [
    "mean_response_time_sorted_by_participant",
    "experiment_anova_statistics",
    "average_reaction_time_",
];

/// File names of one run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub aggregate: String,
    pub anova: String,
    pub boxplot: String,
    pub mean_se: String,
    pub pointplot: String,
}

impl ArtifactNames {
    /// Names for a population run (`None`) or a single participant.
    pub fn for_scope(participant: Option<&str>) -> Self {
        let suffix = participant.map(|p| format!("_{}", p)).unwrap_or_default();
        let anova = match participant {
            Some(p) => format!("experiment_anova_statistics_{}.csv", p),
            None => "experiment_anova_statistics_all_participants.csv".to_string(),
        };

        Self {
            aggregate: format!("mean_response_time_sorted_by_participant{}.csv", suffix),
            anova,
            boxplot: format!("average_reaction_time_boxplot_layout{}.svg", suffix),
            mean_se: format!("average_reaction_time_mean_se{}.svg", suffix),
            pointplot: format!("average_reaction_time_pointplot{}.svg", suffix),
        }
    }
}

/// Paths of the artifacts a job persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub aggregate_csv: PathBuf,
    pub anova_csv: PathBuf,
    pub charts: Vec<PathBuf>,
}

impl ArtifactSet {
    /// All artifact paths, tables first.
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.aggregate_csv.as_path(), self.anova_csv.as_path()];
        paths.extend(self.charts.iter().map(PathBuf::as_path));
        paths
    }
}

/// Format a float the same way on every run.
fn format_float(value: f64) -> String {
    value.to_string()
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Render aggregate rows as CSV.
pub fn render_aggregate_csv(rows: &[AggregateRow]) -> Result<Vec<u8>, csv::Error> {
    let mut sorted: Vec<&AggregateRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.participant
            .cmp(&b.participant)
            .then_with(|| a.layout_type.cmp(&b.layout_type))
            .then_with(|| a.table.cmp(&b.table))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(schema::AGGREGATE_COLUMNS)?;
    for row in sorted {
        writer.write_record([
            row.participant.clone(),
            row.layout_type.clone(),
            row.table.to_string(),
            format_float(row.mean_response_time),
        ])?;
    }
    finish_csv(writer)
}

/// Render the ANOVA table as CSV. Undefined statistics are empty cells.
pub fn render_anova_csv(table: &AnovaTable) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(schema::ANOVA_COLUMNS)?;
    for row in &table.rows {
        writer.write_record([
            row.source.clone(),
            format_float(row.sum_sq),
            row.df.to_string(),
            format_optional(row.f_value),
            format_optional(row.p_value),
        ])?;
    }
    finish_csv(writer)
}

/// Write `bytes` to `dir/file_name` through a temporary file and a rename.
fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AnalysisError> {
    std::fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))?;
    let path = dir.join(file_name);

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AnalysisError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| AnalysisError::io(&path, e))?;
    tmp.persist(&path)
        .map_err(|e| AnalysisError::io(&path, e.error))?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

/// Persists the artifacts of one run.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    charts: Option<ChartStyle>,
}

impl ReportWriter {
    /// Create a writer for `output_dir`.
    pub fn new(output_dir: PathBuf, config: &ReportConfig) -> Self {
        let charts = config.charts.then(|| ChartStyle {
            width: config.chart_width,
            height: config.chart_height,
        });
        Self { output_dir, charts }
    }

    /// Write the aggregate table.
    pub fn write_aggregate(
        &self,
        rows: &[AggregateRow],
        participant: Option<&str>,
    ) -> Result<PathBuf, AnalysisError> {
        let names = ArtifactNames::for_scope(participant);
        let bytes = render_aggregate_csv(rows)
            .map_err(|e| AnalysisError::csv(self.output_dir.join(&names.aggregate), e))?;
        let path = write_atomic(&self.output_dir, &names.aggregate, &bytes)?;
        info!("Aggregated data saved to {}", path.display());
        Ok(path)
    }

    /// Write the ANOVA table.
    pub fn write_anova(
        &self,
        table: &AnovaTable,
        participant: Option<&str>,
    ) -> Result<PathBuf, AnalysisError> {
        let names = ArtifactNames::for_scope(participant);
        let bytes = render_anova_csv(table)
            .map_err(|e| AnalysisError::csv(self.output_dir.join(&names.anova), e))?;
        let path = write_atomic(&self.output_dir, &names.anova, &bytes)?;
        match participant {
            Some(p) => info!("ANOVA statistics for {} saved to {}", p, path.display()),
            None => info!("ANOVA statistics saved to {}", path.display()),
        }
        Ok(path)
    }

    /// Draw and write the three charts. Returns no paths when charts are disabled.
    pub fn write_charts(
        &self,
        rows: &[AggregateRow],
        participant: Option<&str>,
    ) -> Result<Vec<PathBuf>, AnalysisError> {
        let Some(style) = self.charts else {
            debug!("Chart rendering disabled");
            return Ok(Vec::new());
        };

        let scoped = match participant {
            Some(p) => filter_participant(rows, p),
            None => rows.to_vec(),
        };
        let names = ArtifactNames::for_scope(participant);

        let rendered = [
            (&names.boxplot, charts::boxplot_by_layout(&scoped, participant, style)),
            (&names.mean_se, charts::mean_se_by_layout(&scoped, participant, style)),
            (&names.pointplot, charts::pointplot_by_layout_and_table(&scoped, participant, style)),
        ];

        let mut paths = Vec::with_capacity(rendered.len());
        for (name, svg) in rendered {
            let path = write_atomic(&self.output_dir, name, svg.as_bytes())?;
            info!("Chart saved to {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }

    /// Write every artifact. Stops at the first failure; earlier artifacts stay on disk.
    pub fn write_all(
        &self,
        rows: &[AggregateRow],
        anova: &AnovaTable,
        participant: Option<&str>,
    ) -> Result<ArtifactSet, AnalysisError> {
        let aggregate_csv = self.write_aggregate(rows, participant)?;
        let anova_csv = self.write_anova(anova, participant)?;
        let charts = self.write_charts(rows, participant)?;

        Ok(ArtifactSet {
            aggregate_csv,
            anova_csv,
            charts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnovaRow;
    use tempfile::TempDir;

    fn rows() -> Vec<AggregateRow> {
        vec![
            AggregateRow {
                participant: "P2".to_string(),
                layout_type: "random".to_string(),
                table: 1,
                mean_response_time: 420.5,
            },
            AggregateRow {
                participant: "P1".to_string(),
                layout_type: "repeated".to_string(),
                table: 2,
                mean_response_time: 380.25,
            },
            AggregateRow {
                participant: "P1".to_string(),
                layout_type: "random".to_string(),
                table: 1,
                mean_response_time: 400.0,
            },
        ]
    }

    fn anova() -> AnovaTable {
        AnovaTable {
            rows: vec![
                AnovaRow {
                    source: "layoutType".to_string(),
                    sum_sq: 12.5,
                    df: 1,
                    f_value: Some(3.25),
                    p_value: Some(0.125),
                },
                AnovaRow {
                    source: "Residual".to_string(),
                    sum_sq: 8.0,
                    df: 4,
                    f_value: None,
                    p_value: None,
                },
            ],
            observations: 6,
        }
    }

    #[test]
    fn test_artifact_names() {
        let all = ArtifactNames::for_scope(None);
        assert_eq!(all.aggregate, "mean_response_time_sorted_by_participant.csv");
        assert_eq!(all.anova, "experiment_anova_statistics_all_participants.csv");
        assert_eq!(all.pointplot, "average_reaction_time_pointplot.svg");

        let one = ArtifactNames::for_scope(Some("P1"));
        assert_eq!(one.aggregate, "mean_response_time_sorted_by_participant_P1.csv");
        assert_eq!(one.anova, "experiment_anova_statistics_P1.csv");
        assert_eq!(one.boxplot, "average_reaction_time_boxplot_layout_P1.svg");
        assert_eq!(one.mean_se, "average_reaction_time_mean_se_P1.svg");
    }

    #[test]
    fn test_render_aggregate_csv_sorted() {
        let csv = String::from_utf8(render_aggregate_csv(&rows()).unwrap()).unwrap();
        assert_eq!(
            csv,
            "participant,layoutType,Table,MeanResponseTime\n\
             P1,random,1,400\n\
             P1,repeated,2,380.25\n\
             P2,random,1,420.5\n"
        );
    }

    #[test]
    fn test_render_anova_csv() {
        let csv = String::from_utf8(render_anova_csv(&anova()).unwrap()).unwrap();
        assert_eq!(
            csv,
            "source,sum_sq,df,F,PR(>F)\n\
             layoutType,12.5,1,3.25,0.125\n\
             Residual,8,4,,\n"
        );
    }

    #[test]
    fn test_write_all_population() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().to_path_buf(), &ReportConfig::default());

        let set = writer.write_all(&rows(), &anova(), None).unwrap();
        assert_eq!(set.charts.len(), 3);
        for path in set.paths() {
            assert!(path.exists(), "{} missing", path.display());
        }
        let svg = std::fs::read_to_string(&set.charts[0]).unwrap();
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn test_write_all_participant_without_charts() {
        let dir = TempDir::new().unwrap();
        let config = ReportConfig {
            charts: false,
            ..ReportConfig::default()
        };
        let writer = ReportWriter::new(dir.path().join("out"), &config);

        let set = writer.write_all(&rows(), &anova(), Some("P1")).unwrap();
        assert!(set.charts.is_empty());
        assert!(set
            .anova_csv
            .ends_with("experiment_anova_statistics_P1.csv"));
        assert!(dir.path().join("out").join("mean_response_time_sorted_by_participant_P1.csv").exists());
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().to_path_buf(), &ReportConfig::default());

        let first = writer.write_all(&rows(), &anova(), None).unwrap();
        let before: Vec<Vec<u8>> = first.paths().iter().map(|p| std::fs::read(p).unwrap()).collect();
        let second = writer.write_all(&rows(), &anova(), None).unwrap();
        let after: Vec<Vec<u8>> = second.paths().iter().map(|p| std::fs::read(p).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_failed_write_keeps_earlier_artifacts() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path().to_path_buf(), &ReportConfig::default());
        // A directory where the ANOVA file should go makes the rename fail.
        std::fs::create_dir(dir.path().join("experiment_anova_statistics_all_participants.csv"))
            .unwrap();

        let err = writer.write_all(&rows(), &anova(), None).unwrap_err();
        assert_eq!(err.kind(), "io_failure");
        assert!(dir
            .path()
            .join("mean_response_time_sorted_by_participant.csv")
            .exists());
    }
}
