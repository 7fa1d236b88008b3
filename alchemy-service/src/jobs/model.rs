//! Job record and lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::Payload;
use super::task::TaskKind;
use crate::error::JobError;
use crate::schemas::ParseResponse;

/// Opaque unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
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
        self.0.fmt(f)
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered, waiting for an executor
    Pending,
    /// Owned by a worker or an inline caller
    Running,
    /// Finished with a result
    Done,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Transitions only move forward: Pending -> Running -> Done | Failed.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Done) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of requested work.
///
/// After submission only the executor that owns the job (a queue worker or
/// the `run_sync` caller) mutates it. Lifecycle fields are only written by
/// `start`, `complete` and `fail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Requested task name; parsed into a `TaskKind` at dispatch time
    pub task: String,
    #[serde(skip)]
    pub payload: Payload,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ParseResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job for an arbitrary task name.
    pub fn new(task: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: JobId::new(),
            task: task.into(),
            payload,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn for_task(kind: TaskKind, payload: Payload) -> Self {
        Self::new(kind.to_string(), payload)
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Present only once the job is `Done`.
    pub fn result(&self) -> Option<&ParseResponse> {
        self.result.as_ref()
    }

    /// Present only once the job is `Failed`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition_to(&mut self, target: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Pending -> Running.
    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition_to(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Done. `completed_at` is stamped after the status flips.
    pub fn complete(&mut self, result: ParseResponse) -> Result<(), JobError> {
        self.transition_to(JobStatus::Done)?;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Failed. `completed_at` is stamped after the status flips.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Counts of registered jobs by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobSummary {
    pub(crate) fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Done => self.done += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}
