//! Mean response time aggregation and descriptive statistics.
//!
//! This module reduces cleaned trials to one mean per
//! (participant, layout type, table) cell and computes the summaries the
//! charts are drawn from.

use crate::analysis::outliers::{mean, sample_std_dev};
use crate::models::{AggregateRow, CleanedTrial};
use std::collections::BTreeMap;
use tracing::info;

/// Compute one mean response time per (participant, layout type, table).
///
/// Rows come back sorted by participant, then layout type, then table.
/// Cells without trials do not appear.
pub fn aggregate_means(trials: &[CleanedTrial]) -> Vec<AggregateRow> {
    let mut cells: BTreeMap<(&str, &str, u32), (f64, usize)> = BTreeMap::new();

    for trial in trials {
        let cell = cells
            .entry((trial.participant.as_str(), trial.layout_type.as_str(), trial.table))
            .or_insert((0.0, 0));
        cell.0 += trial.response_time;
        cell.1 += 1;
    }

    let rows: Vec<AggregateRow> = cells
        .into_iter()
        .map(|((participant, layout_type, table), (sum, count))| AggregateRow {
            participant: participant.to_string(),
            layout_type: layout_type.to_string(),
            table,
            mean_response_time: sum / count as f64,
        })
        .collect();

    info!("Computed {} mean response time cells", rows.len());
    rows
}

/// Keep the rows of one participant.
pub fn filter_participant(rows: &[AggregateRow], participant: &str) -> Vec<AggregateRow> {
    rows.iter()
        .filter(|r| r.participant == participant)
        .cloned()
        .collect()
}

/// Descriptive statistics of a set of means.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Standard error of the mean; `None` below two values.
    pub std_err: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Summary {
    /// Summarize `values`; `None` when empty.
    pub fn of(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let std_err = if values.len() >= 2 {
            sample_std_dev(values).map(|sd| sd / (values.len() as f64).sqrt())
        } else {
            None
        };

        Some(Self {
            count: values.len(),
            mean,
            std_err,
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear-interpolated quantile of sorted, non-empty values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Summary of mean response times per layout type.
pub fn summary_by_layout(rows: &[AggregateRow]) -> BTreeMap<String, Summary> {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        values
            .entry(row.layout_type.clone())
            .or_default()
            .push(row.mean_response_time);
    }

    values
        .into_iter()
        .filter_map(|(layout, v)| Summary::of(&v).map(|s| (layout, s)))
        .collect()
}

/// Summary of mean response times per (layout type, table).
pub fn summary_by_layout_and_table(rows: &[AggregateRow]) -> BTreeMap<(String, u32), Summary> {
    let mut values: BTreeMap<(String, u32), Vec<f64>> = BTreeMap::new();
    for row in rows {
        values
            .entry((row.layout_type.clone(), row.table))
            .or_default()
            .push(row.mean_response_time);
    }

    values
        .into_iter()
        .filter_map(|(key, v)| Summary::of(&v).map(|s| (key, s)))
        .collect()
}
