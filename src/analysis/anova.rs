//! Two-factor ANOVA over aggregated means.
//!
//! The model is `mean ~ layoutType * Table` with both factors treated as
//! categorical and treatment (dummy) coding. Sums of squares are type II:
//! each main effect is tested after the other main effect, and the
//! interaction after both.

use crate::error::AnalysisError;
use crate::models::{AggregateRow, AnovaRow, AnovaTable};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Source names used in the table.
pub const LAYOUT_SOURCE: &str = "layoutType";
pub const TABLE_SOURCE: &str = "Table";
pub const INTERACTION_SOURCE: &str = "layoutType:Table";
pub const RESIDUAL_SOURCE: &str = "Residual";

/// Relative norm below which a design column counts as linearly dependent.
const RANK_TOLERANCE: f64 = 1e-10;

/// Which rows the test runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestScope<'a> {
    /// Every participant.
    Population,
    /// One participant's rows only.
    Participant(&'a str),
}

/// Result of the test stage.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Table(AnovaTable),
    /// No rows in scope; nothing further to compute or persist.
    NoResult { reason: String },
}

/// Residual sum of squares and rank of a least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    rss: f64,
    rank: usize,
}

/// Fit `y` on `columns` by orthogonal projection.
///
/// Columns are orthonormalized with modified Gram-Schmidt (two passes);
/// a column whose remaining norm is negligible is dropped, so the rank
/// reflects empty cells and aliased terms.
fn least_squares(columns: &[Vec<f64>], y: &[f64]) -> Fit {
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(columns.len());

    for column in columns {
        let original_norm = dot(column, column).sqrt();
        if original_norm == 0.0 {
            continue;
        }
        let mut v = column.clone();
        for _ in 0..2 {
            for q in &basis {
                let proj = dot(q, &v);
                for (vi, qi) in v.iter_mut().zip(q) {
                    *vi -= proj * qi;
                }
            }
        }
        let norm = dot(&v, &v).sqrt();
        if norm > RANK_TOLERANCE * original_norm {
            for vi in v.iter_mut() {
                *vi /= norm;
            }
            basis.push(v);
        }
    }

    let mut residual = y.to_vec();
    for q in &basis {
        let proj = dot(q, &residual);
        for (ri, qi) in residual.iter_mut().zip(q) {
            *ri -= proj * qi;
        }
    }

    Fit {
        rss: dot(&residual, &residual),
        rank: basis.len(),
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Dummy columns for a categorical factor, first level as baseline.
fn dummies<T: PartialEq>(values: &[T], levels: &[T]) -> Vec<Vec<f64>> {
    levels
        .iter()
        .skip(1)
        .map(|level| {
            values
                .iter()
                .map(|v| if v == level { 1.0 } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Element-wise products of every pair of columns.
fn interactions(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for ca in a {
        for cb in b {
            out.push(ca.iter().zip(cb).map(|(x, y)| x * y).collect());
        }
    }
    out
}

/// Upper-tail probability of an F statistic.
fn f_upper_tail(f: f64, df_num: u32, df_den: u32) -> Option<f64> {
    let dist = FisherSnedecor::new(df_num as f64, df_den as f64)
        .map_err(|e| warn!("Cannot build F({}, {}) distribution: {}", df_num, df_den, e))
        .ok()?;
    Some(dist.sf(f))
}

fn effect_row(source: &str, sum_sq: f64, df: usize, residual_ms: Option<f64>, df_res: usize) -> AnovaRow {
    let sum_sq = sum_sq.max(0.0);
    let f_value = match residual_ms {
        Some(ms) if df > 0 => Some((sum_sq / df as f64) / ms),
        _ => None,
    };
    let p_value = f_value.and_then(|f| f_upper_tail(f, df as u32, df_res as u32));

    AnovaRow {
        source: source.to_string(),
        sum_sq,
        df: df as u32,
        f_value,
        p_value,
    }
}

/// Run the two-factor ANOVA on the rows in `scope`.
///
/// Returns `NoResult` when no row is in scope and `SingularModel` when
/// either factor has fewer than two levels.
pub fn two_way_anova(rows: &[AggregateRow], scope: TestScope<'_>) -> Result<TestOutcome, AnalysisError> {
    let rows: Vec<&AggregateRow> = match scope {
        TestScope::Population => {
            info!("Running ANOVA over all participants");
            rows.iter().collect()
        }
        TestScope::Participant(participant) => {
            info!("Running ANOVA for participant '{}'", participant);
            rows.iter().filter(|r| r.participant == participant).collect()
        }
    };

    if rows.is_empty() {
        let reason = match scope {
            TestScope::Population => "no aggregated data".to_string(),
            TestScope::Participant(p) => format!("no data for participant '{}'", p),
        };
        warn!("ANOVA skipped: {}", reason);
        return Ok(TestOutcome::NoResult { reason });
    }

    let layouts: Vec<&str> = rows
        .iter()
        .map(|r| r.layout_type.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let tables: Vec<u32> = rows
        .iter()
        .map(|r| r.table)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if layouts.len() < 2 {
        return Err(AnalysisError::SingularModel(format!(
            "layoutType has {} level(s), at least 2 required",
            layouts.len()
        )));
    }
    if tables.len() < 2 {
        return Err(AnalysisError::SingularModel(format!(
            "Table has {} level(s), at least 2 required",
            tables.len()
        )));
    }

    let n = rows.len();
    let y: Vec<f64> = rows.iter().map(|r| r.mean_response_time).collect();
    let layout_values: Vec<&str> = rows.iter().map(|r| r.layout_type.as_str()).collect();
    let table_values: Vec<u32> = rows.iter().map(|r| r.table).collect();

    let intercept = vec![1.0; n];
    let a = dummies(&layout_values, &layouts);
    let b = dummies(&table_values, &tables);
    let ab = interactions(&a, &b);

    let design = |parts: &[&[Vec<f64>]]| -> Vec<Vec<f64>> {
        let mut cols = vec![intercept.clone()];
        for part in parts {
            cols.extend(part.iter().cloned());
        }
        cols
    };

    let fit_a = least_squares(&design(&[a.as_slice()]), &y);
    let fit_b = least_squares(&design(&[b.as_slice()]), &y);
    let fit_additive = least_squares(&design(&[a.as_slice(), b.as_slice()]), &y);
    let fit_full = least_squares(&design(&[a.as_slice(), b.as_slice(), ab.as_slice()]), &y);

    debug!(
        "Fits: A rank {} rss {}, B rank {} rss {}, A+B rank {} rss {}, full rank {} rss {}",
        fit_a.rank,
        fit_a.rss,
        fit_b.rank,
        fit_b.rss,
        fit_additive.rank,
        fit_additive.rss,
        fit_full.rank,
        fit_full.rss
    );

    let df_res = n - fit_full.rank;
    let residual_ms = if df_res > 0 && fit_full.rss > 0.0 {
        Some(fit_full.rss / df_res as f64)
    } else {
        None
    };
    if df_res == 0 {
        info!("No residual degrees of freedom: F statistics are undefined");
    }

    let table = AnovaTable {
        rows: vec![
            effect_row(
                LAYOUT_SOURCE,
                fit_b.rss - fit_additive.rss,
                fit_additive.rank - fit_b.rank,
                residual_ms,
                df_res,
            ),
            effect_row(
                TABLE_SOURCE,
                fit_a.rss - fit_additive.rss,
                fit_additive.rank - fit_a.rank,
                residual_ms,
                df_res,
            ),
            effect_row(
                INTERACTION_SOURCE,
                fit_additive.rss - fit_full.rss,
                fit_full.rank - fit_additive.rank,
                residual_ms,
                df_res,
            ),
            AnovaRow {
                source: RESIDUAL_SOURCE.to_string(),
                sum_sq: fit_full.rss.max(0.0),
                df: df_res as u32,
                f_value: None,
                p_value: None,
            },
        ],
        observations: n,
    };

    for row in &table.rows {
        info!(
            "{:<18} SS={:.4} df={} F={} p={}",
            row.source,
            row.sum_sq,
            row.df,
            row.f_value.map(|f| format!("{:.4}", f)).unwrap_or_else(|| "-".into()),
            row.p_value.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "-".into())
        );
    }

    Ok(TestOutcome::Table(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(participant: &str, layout: &str, table: u32, mean: f64) -> AggregateRow {
        AggregateRow {
            participant: participant.to_string(),
            layout_type: layout.to_string(),
            table,
            mean_response_time: mean,
        }
    }

    fn table_of(outcome: TestOutcome) -> AnovaTable {
        match outcome {
            TestOutcome::Table(t) => t,
            TestOutcome::NoResult { reason } => panic!("unexpected no result: {}", reason),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Balanced 2x2 design, two observations per cell.
    fn balanced_rows() -> Vec<AggregateRow> {
        vec![
            row("P1", "random", 1, 10.0),
            row("P2", "random", 1, 12.0),
            row("P1", "random", 2, 14.0),
            row("P2", "random", 2, 16.0),
            row("P1", "repeated", 1, 20.0),
            row("P2", "repeated", 1, 22.0),
            row("P1", "repeated", 2, 30.0),
            row("P2", "repeated", 2, 32.0),
        ]
    }

    #[test]
    fn test_balanced_design_sums_of_squares() {
        // Cell means 11, 15, 21, 31; grand mean 19.5.
        let table = table_of(two_way_anova(&balanced_rows(), TestScope::Population).unwrap());

        let layout = table.row(LAYOUT_SOURCE).unwrap();
        assert!(close(layout.sum_sq, 338.0));
        assert_eq!(layout.df, 1);

        let tables = table.row(TABLE_SOURCE).unwrap();
        assert!(close(tables.sum_sq, 98.0));
        assert_eq!(tables.df, 1);

        let inter = table.row(INTERACTION_SOURCE).unwrap();
        assert!(close(inter.sum_sq, 18.0));
        assert_eq!(inter.df, 1);

        let resid = table.row(RESIDUAL_SOURCE).unwrap();
        assert!(close(resid.sum_sq, 8.0));
        assert_eq!(resid.df, 4);
        assert!(resid.f_value.is_none());

        // MS_res = 2.
        assert!(close(layout.f_value.unwrap(), 169.0));
        assert!(close(tables.f_value.unwrap(), 49.0));
        assert!(close(inter.f_value.unwrap(), 9.0));

        let p = inter.p_value.unwrap();
        assert!(p > 0.03 && p < 0.05, "p = {}", p);
        assert!(layout.p_value.unwrap() < 0.001);
    }

    #[test]
    fn test_row_order_and_names() {
        let table = table_of(two_way_anova(&balanced_rows(), TestScope::Population).unwrap());
        let names: Vec<&str> = table.rows.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, vec!["layoutType", "Table", "layoutType:Table", "Residual"]);
        assert_eq!(table.observations, 8);
    }

    #[test]
    fn test_single_participant_has_no_residual_df() {
        let table = table_of(two_way_anova(&balanced_rows(), TestScope::Participant("P1")).unwrap());
        assert_eq!(table.observations, 4);
        let resid = table.row(RESIDUAL_SOURCE).unwrap();
        assert_eq!(resid.df, 0);
        assert!(resid.sum_sq < 1e-9);
        for source in [LAYOUT_SOURCE, TABLE_SOURCE, INTERACTION_SOURCE] {
            let r = table.row(source).unwrap();
            assert_eq!(r.df, 1);
            assert!(r.f_value.is_none());
            assert!(r.p_value.is_none());
        }
    }

    #[test]
    fn test_missing_cell_reduces_interaction_df() {
        let mut rows = balanced_rows();
        rows.retain(|r| !(r.layout_type == "repeated" && r.table == 2));
        let table = table_of(two_way_anova(&rows, TestScope::Population).unwrap());
        assert_eq!(table.row(INTERACTION_SOURCE).unwrap().df, 0);
        assert_eq!(table.row(RESIDUAL_SOURCE).unwrap().df, 3);
    }

    #[test]
    fn test_unknown_participant_is_no_result() {
        let outcome = two_way_anova(&balanced_rows(), TestScope::Participant("P9")).unwrap();
        assert!(matches!(outcome, TestOutcome::NoResult { .. }));
    }

    #[test]
    fn test_single_layout_is_singular() {
        let rows: Vec<AggregateRow> = balanced_rows()
            .into_iter()
            .filter(|r| r.layout_type == "random")
            .collect();
        let err = two_way_anova(&rows, TestScope::Population).unwrap_err();
        assert!(matches!(err, AnalysisError::SingularModel(_)));
    }

    #[test]
    fn test_single_table_is_singular() {
        let rows: Vec<AggregateRow> = balanced_rows().into_iter().filter(|r| r.table == 1).collect();
        let err = two_way_anova(&rows, TestScope::Population).unwrap_err();
        assert_eq!(err.kind(), "singular_model");
    }

    #[test]
    fn test_least_squares_rank_drops_duplicates() {
        let y = vec![1.0, 2.0, 3.0];
        let ones = vec![1.0; 3];
        let fit = least_squares(&[ones.clone(), ones], &y);
        assert_eq!(fit.rank, 1);
        assert!(close(fit.rss, 2.0));
    }

    #[test]
    fn test_deterministic() {
        let a = two_way_anova(&balanced_rows(), TestScope::Population).unwrap();
        let b = two_way_anova(&balanced_rows(), TestScope::Population).unwrap();
        assert_eq!(a, b);
    }
}
