//! Job data models.

use crate::analysis::cleaner::CleaningReport;
use crate::error::AnalysisError;
use crate::report::ArtifactSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Whether the job will never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// What a succeeded job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every artifact was written.
    Completed {
        artifacts: ArtifactSet,
        cleaning: CleaningReport,
    },
    /// Nothing to analyze in scope; no artifacts were written.
    NoResult {
        reason: String,
        cleaning: CleaningReport,
    },
}

impl JobOutcome {
    pub fn cleaning(&self) -> &CleaningReport {
        match self {
            JobOutcome::Completed { cleaning, .. } | JobOutcome::NoResult { cleaning, .. } => cleaning,
        }
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Stable machine-readable label, e.g. `singular_model`.
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
}

impl JobFailure {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

impl From<&AnalysisError> for JobFailure {
    fn from(err: &AnalysisError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.kind)
    }
}

/// A unit of work as sent through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: JobId,
    pub dataset: String,
}

/// Progress reported by a worker.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Started {
        id: JobId,
        at: DateTime<Utc>,
    },
    Finished {
        id: JobId,
        at: DateTime<Utc>,
        result: Result<JobOutcome, JobFailure>,
    },
}

impl JobUpdate {
    pub fn id(&self) -> JobId {
        match self {
            JobUpdate::Started { id, .. } | JobUpdate::Finished { id, .. } => *id,
        }
    }
}

/// Externally visible status of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Failure reason, or the explanation of a result-less success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Answer to a result query.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Ready(ArtifactSet),
    NoResult(String),
    Pending(JobState),
    Failed(JobFailure),
    NotFound,
}

/// A tracked analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub dataset: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
    pub failure: Option<JobFailure>,
}

impl Job {
    pub fn new(id: JobId, dataset: impl Into<String>) -> Self {
        Self {
            id,
            dataset: dataset.into(),
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            outcome: None,
            failure: None,
        }
    }

    /// Apply a worker update. Returns `false` when the transition is not
    /// allowed from the current state.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        match update {
            JobUpdate::Started { at, .. } => {
                if self.state != JobState::Queued {
                    return false;
                }
                self.state = JobState::Running;
                self.started_at = Some(at);
                true
            }
            JobUpdate::Finished { at, result, .. } => {
                if self.state.is_terminal() {
                    return false;
                }
                self.finished_at = Some(at);
                match result {
                    Ok(outcome) => {
                        self.state = JobState::Succeeded;
                        self.outcome = Some(outcome);
                    }
                    Err(failure) => {
                        self.state = JobState::Failed;
                        self.failure = Some(failure);
                    }
                }
                true
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        let reason = match (&self.failure, &self.outcome) {
            (Some(failure), _) => Some(failure.reason.clone()),
            (None, Some(JobOutcome::NoResult { reason, .. })) => Some(reason.clone()),
            _ => None,
        };
        JobStatus {
            state: self.state,
            reason,
        }
    }

    pub fn result(&self) -> FetchResult {
        match (self.state, &self.outcome, &self.failure) {
            (JobState::Succeeded, Some(JobOutcome::Completed { artifacts, .. }), _) => {
                FetchResult::Ready(artifacts.clone())
            }
            (JobState::Succeeded, Some(JobOutcome::NoResult { reason, .. }), _) => {
                FetchResult::NoResult(reason.clone())
            }
            (JobState::Failed, _, Some(failure)) => FetchResult::Failed(failure.clone()),
            (state, _, _) => FetchResult::Pending(state),
        }
    }

    /// Wall-clock run time, once finished.
    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifacts() -> ArtifactSet {
        ArtifactSet {
            aggregate_csv: PathBuf::from("out/agg.csv"),
            anova_csv: PathBuf::from("out/anova.csv"),
            charts: vec![],
        }
    }

    #[test]
    fn test_job_lifecycle_success() {
        let id = JobId::new();
        let mut job = Job::new(id, "P1");
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.result(), FetchResult::Pending(JobState::Queued));

        assert!(job.apply(JobUpdate::Started { id, at: Utc::now() }));
        assert_eq!(job.state, JobState::Running);

        let outcome = JobOutcome::Completed {
            artifacts: artifacts(),
            cleaning: CleaningReport::default(),
        };
        assert!(job.apply(JobUpdate::Finished {
            id,
            at: Utc::now(),
            result: Ok(outcome),
        }));
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.result(), FetchResult::Ready(artifacts()));
        assert!(job.status().reason.is_none());
        assert!(job.duration_seconds().is_some());
    }

    #[test]
    fn test_failed_job_is_final() {
        let id = JobId::new();
        let mut job = Job::new(id, "P1");
        job.apply(JobUpdate::Started { id, at: Utc::now() });
        job.apply(JobUpdate::Finished {
            id,
            at: Utc::now(),
            result: Err(JobFailure::new("singular_model", "one layout")),
        });
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.status().reason.as_deref(), Some("one layout"));

        // No transition leaves a terminal state.
        assert!(!job.apply(JobUpdate::Started { id, at: Utc::now() }));
        assert!(!job.apply(JobUpdate::Finished {
            id,
            at: Utc::now(),
            result: Ok(JobOutcome::NoResult {
                reason: "x".into(),
                cleaning: CleaningReport::default(),
            }),
        }));
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn test_no_result_is_distinct_from_failure() {
        let id = JobId::new();
        let mut job = Job::new(id, "P9");
        job.apply(JobUpdate::Started { id, at: Utc::now() });
        job.apply(JobUpdate::Finished {
            id,
            at: Utc::now(),
            result: Ok(JobOutcome::NoResult {
                reason: "no data for participant 'P9'".into(),
                cleaning: CleaningReport::default(),
            }),
        });
        assert_eq!(job.state, JobState::Succeeded);
        assert!(matches!(job.result(), FetchResult::NoResult(_)));
    }

    #[test]
    fn test_failure_from_error() {
        let failure = JobFailure::from(&AnalysisError::MissingColumn("result".into()));
        assert_eq!(failure.kind, "missing_column");
        assert_eq!(failure.reason, "missing column 'result'");
    }

    #[test]
    fn test_request_serializes() {
        let request = JobRequest {
            id: JobId::new(),
            dataset: "P1_results.csv".into(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: JobRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
