//! Job orchestration.
//!
//! A job runs one dataset through the pipeline on a background worker;
//! callers observe it only through status queries.

pub mod job;
pub mod orchestrator;
pub mod pipeline;

pub use job::{FetchResult, Job, JobOutcome};
pub use orchestrator::Orchestrator;
pub use pipeline::AnalysisPipeline;
