// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Zettelwerk task-card spooler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ZettelwerkError;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id received from an external caller (CLI argument, batch file).
    pub fn parse(s: &str) -> Result<Self, ZettelwerkError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ZettelwerkError::Validation(format!("malformed job id: {s}")))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority — a total order used only for claim ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Wire string, as stored in the database and accepted from producers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Numeric rank for claim ordering (higher claims first).
    pub fn rank(&self) -> i64 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = ZettelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ZettelwerkError::Validation(format!(
                "unrecognized priority {other:?} (expected high, medium, or low)"
            ))),
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task category. Opaque to the queue — carried through for the card layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Work,
    Personal,
    Urgent,
    Learning,
    Health,
    Other,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Urgent => "urgent",
            Self::Learning => "learning",
            Self::Health => "health",
            Self::Other => "other",
        }
    }
}

impl Default for TaskCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = ZettelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            "urgent" => Ok(Self::Urgent),
            "learning" => Ok(Self::Learning),
            "health" => Ok(Self::Health),
            "other" => Ok(Self::Other),
            other => Err(ZettelwerkError::Validation(format!(
                "unrecognized category {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a print job.
///
/// Transitions (enforced by the queue, never written directly):
///   pending → in_progress → completed
///   pending → in_progress → pending      (failed attempt, retries left)
///   pending → in_progress → failed       (failed attempt, retries exhausted)
///
/// `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be claimed.
    Pending,
    /// Claimed by the consumer and being printed.
    InProgress,
    /// Successfully printed.
    Completed,
    /// Retries exhausted — see the job's `last_error`.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ZettelwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ZettelwerkError::Validation(format!(
                "unrecognized job status {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The task description carried by a job.
///
/// Validated once at admission; the queue itself never reinterprets these
/// fields. `category`, `estimated_time`, and `due_date` exist purely for the
/// printed card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: TaskCategory,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category: TaskCategory::default(),
            estimated_time: None,
            due_date: None,
        }
    }

    /// Admission check run by `enqueue` before any row is written.
    pub fn validate(&self) -> Result<(), ZettelwerkError> {
        if self.title.trim().is_empty() {
            return Err(ZettelwerkError::Validation(
                "task title must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A complete print job — one row in the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub payload: TaskPayload,
    pub priority: TaskPriority,
    pub status: JobStatus,
    /// Number of print attempts that have failed so far.
    pub attempts: u32,
    /// Ceiling on attempts, fixed at creation.
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reason for the most recent failed attempt. Never cleared.
    pub last_error: Option<String>,
    /// Earliest time this job may be claimed again after a failed attempt.
    /// `None` means immediately eligible.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl PrintJob {
    pub fn new(payload: TaskPayload, priority: TaskPriority, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            payload,
            priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            created_at: now,
            updated_at: now,
            last_error: None,
            next_attempt_at: None,
        }
    }
}

/// Admission request for a single job, as accepted from producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub payload: TaskPayload,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Overrides the configured default when present.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Aggregate queue counters, computed from a full scan of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    /// Jobs admitted in the trailing 24 hours.
    pub last_24h: u64,
    /// Coarse health signal for the status surface: "healthy" or "busy".
    pub health: String,
}

impl QueueStats {
    /// Jobs that still need consumer work.
    pub fn backlog(&self) -> u64 {
        self.pending + self.in_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn priority_wire_strings_round_trip() {
        for p in [TaskPriority::High, TaskPriority::Medium, TaskPriority::Low] {
            assert_eq!(TaskPriority::from_str(p.as_str()).expect("parse"), p);
        }
    }

    #[test]
    fn unknown_priority_is_a_validation_error() {
        let err = TaskPriority::from_str("critical").expect_err("must reject");
        assert!(matches!(err, ZettelwerkError::Validation(_)));
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(TaskPriority::High.rank() > TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() > TaskPriority::Low.rank());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn empty_title_rejected() {
        let payload = TaskPayload::new("   ");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn new_job_starts_pending_with_zero_attempts() {
        let job = PrintJob::new(TaskPayload::new("water the plants"), TaskPriority::Low, 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
        assert!(job.next_attempt_at.is_none());
    }

    #[test]
    fn malformed_job_id_rejected() {
        assert!(JobId::parse("not-a-uuid").is_err());
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).expect("parse"), id);
    }
}
