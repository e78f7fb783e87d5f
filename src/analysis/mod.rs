//! Analysis stages.
//!
//! Cleaning, outlier removal, aggregation and the two-way ANOVA run in
//! that order on every dataset.

pub mod aggregator;
pub mod anova;
pub mod cleaner;
pub mod outliers;

