//! Report artifacts: aggregate and ANOVA tables plus charts.

pub mod charts;
pub mod generator;

pub use generator::{ArtifactSet, ReportWriter};
