//! Job records tracked by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::operation::{EditKind, EditOperation};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
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

/// Lifecycle state of a job.
///
/// `Queued -> Running -> {Finished | Failed}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Queued,
    /// Job is being processed
    Running,
    /// Job completed and its artifact is available
    Finished,
    /// Job failed
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `Running -> Running` is the re-claim of a redelivered work item.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Running, JobState::Running)
                | (JobState::Running, JobState::Finished)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "finished" => Ok(JobState::Finished),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown job state: {s}")),
        }
    }
}

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Arguments rejected before any engine invocation
    Validation,
    /// Remote fetch failed
    Download,
    /// Engine or script exited unsuccessfully
    Engine,
    /// A wall-clock bound was exceeded
    Timeout,
    /// Anything else (I/O, registry)
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Download => "download",
            FailureKind::Engine => "engine",
            FailureKind::Timeout => "timeout",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// A job as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// The edit to perform
    pub operation: EditOperation,

    /// Job state
    #[serde(default)]
    pub state: JobState,

    /// Output artifact name (when finished)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Failure detail (when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    /// Number of times a worker picked this job up
    #[serde(default)]
    pub attempts: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Finished/failed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(operation: EditOperation) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            operation,
            state: JobState::Queued,
            result: None,
            failure: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn kind(&self) -> EditKind {
        self.operation.kind()
    }

    fn transition(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark job as running.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobState::Running)?;
        self.attempts += 1;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// Mark job as finished with its artifact name.
    pub fn finish(&mut self, output_name: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobState::Finished)?;
        self.result = Some(output_name.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), TransitionError> {
        self.transition(JobState::Failed)?;
        self.failure = Some(failure);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Snapshot exposed through the status interface.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            kind: self.kind(),
            status: self.state,
            result: self.result.clone(),
            error: self.failure.as_ref().map(ToString::to_string),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only job snapshot returned by status lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub kind: EditKind,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
