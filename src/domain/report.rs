use super::expense::ExpenseId;
use crate::error::{AccrualError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The record disappeared from the store between listing and update.
    Deleted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => f.write_str("deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    InvalidRecord(String),
    Transport(String),
    Protocol(String),
    DeadlineExceeded,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::DeadlineExceeded => f.write_str("deadline_exceeded"),
        }
    }
}

impl From<AccrualError> for FailureCause {
    fn from(err: AccrualError) -> Self {
        match err {
            AccrualError::InvalidRecord(msg) => Self::InvalidRecord(msg),
            AccrualError::Protocol(msg) => Self::Protocol(msg),
            AccrualError::Transport(msg) => Self::Transport(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Terminal state of one record within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Accrued {
        id: ExpenseId,
        #[serde(with = "rust_decimal::serde::float")]
        delta: Decimal,
        #[serde(with = "rust_decimal::serde::float")]
        new_amount: Decimal,
    },
    Skipped {
        id: ExpenseId,
        reason: SkipReason,
    },
    Failed {
        id: ExpenseId,
        cause: FailureCause,
    },
}

impl RecordOutcome {
    pub fn id(&self) -> &ExpenseId {
        match self {
            Self::Accrued { id, .. } | Self::Skipped { id, .. } | Self::Failed { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "cause", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted(String),
}

/// Summary of a single accrual run.
///
/// Built while the run executes and handed to the caller once every listed
/// record has reached a terminal outcome. Nothing here is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// One-time records left out of the run. Not counted as attempted.
    pub one_time_ignored: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            attempted: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            one_time_ignored: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        self.attempted += 1;
        match outcome {
            RecordOutcome::Accrued { .. } => self.succeeded += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn abort(&mut self, cause: &AccrualError) {
        self.status = RunStatus::Aborted(cause.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted(_))
    }

    /// Turns an aborted run into a [`AccrualError::RunAborted`].
    pub fn ensure_completed(&self) -> Result<()> {
        match &self.status {
            RunStatus::Aborted(cause) => Err(AccrualError::RunAborted(cause.clone())),
            _ => Ok(()),
        }
    }

    pub fn outcome_for(&self, id: &ExpenseId) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|outcome| outcome.id() == id)
    }
}
