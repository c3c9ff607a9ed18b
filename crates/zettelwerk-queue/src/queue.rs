// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The queue API — the only legitimate way to create or transition jobs.
//
// State machine enforced here:
//
//   pending --[claim: attempts < max_attempts]--> in_progress
//   in_progress --[print succeeds]--> completed                  (terminal)
//   in_progress --[print fails, retries left]--> pending         (attempts += 1)
//   in_progress --[print fails, retries exhausted]--> failed     (terminal)
//
// Every transition goes through a status-guarded conditional update, so a
// competing consumer on the same database can never double-claim a row.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use zettelwerk_core::QueueConfig;
use zettelwerk_core::error::{Result, ZettelwerkError};
use zettelwerk_core::types::{
    JobId, JobStatus, NewJob, PrintJob, QueueStats, TaskPayload, TaskPriority,
};

use crate::retry::RetryPolicy;
use crate::store::{JobStore, JobUpdate};

/// Backlog size beyond which `get_stats` reports the queue as "busy".
const BUSY_BACKLOG_THRESHOLD: u64 = 100;

/// Upper bound on rescans when a claim keeps losing the conditional update.
const MAX_CLAIM_ATTEMPTS: u32 = 8;

/// Shared handle over the durable store.
///
/// The rusqlite-backed `JobStore` is `Send` but not `Sync`, so it lives
/// behind an `Arc<Mutex<>>`; every operation is a short single-statement
/// query, so contention is negligible.  Cloning is cheap and shares the one
/// connection acquired at startup.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<Mutex<JobStore>>,
    default_max_attempts: u32,
    batch_cap: usize,
    retry: RetryPolicy,
}

impl TaskQueue {
    pub fn new(store: JobStore, config: &QueueConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            default_max_attempts: config.default_max_attempts,
            batch_cap: config.batch_cap,
            retry: RetryPolicy::from_config(config),
        }
    }

    // -- Admission -----------------------------------------------------------

    /// Validate and persist a single job; returns its id.
    pub fn enqueue(
        &self,
        payload: TaskPayload,
        priority: TaskPriority,
        max_attempts: Option<u32>,
    ) -> Result<JobId> {
        payload.validate()?;
        let max_attempts = self.resolve_max_attempts(max_attempts)?;

        let job = PrintJob::new(payload, priority, max_attempts);
        let store = self.store.lock().expect("store lock poisoned");
        store.insert(&job)?;

        info!(job_id = %job.id, priority = %job.priority, title = %job.payload.title, "job enqueued");
        Ok(job.id)
    }

    /// Admit a batch of jobs, all or nothing.
    ///
    /// Rejects the whole batch before any row is written if it is empty,
    /// exceeds the cap, or contains any invalid entry.
    pub fn enqueue_batch(&self, batch: Vec<NewJob>) -> Result<Vec<JobId>> {
        if batch.is_empty() {
            return Err(ZettelwerkError::Validation(
                "batch must contain at least one task".into(),
            ));
        }
        if batch.len() > self.batch_cap {
            return Err(ZettelwerkError::Validation(format!(
                "batch of {} tasks exceeds the cap of {}",
                batch.len(),
                self.batch_cap
            )));
        }

        let mut jobs = Vec::with_capacity(batch.len());
        for entry in batch {
            entry.payload.validate()?;
            let max_attempts = self.resolve_max_attempts(entry.max_attempts)?;
            jobs.push(PrintJob::new(entry.payload, entry.priority, max_attempts));
        }

        let mut store = self.store.lock().expect("store lock poisoned");
        store.insert_batch(&jobs)?;

        Ok(jobs.into_iter().map(|j| j.id).collect())
    }

    // -- Consumption ---------------------------------------------------------

    /// Atomically claim the next eligible pending job, if any.
    ///
    /// Losing the conditional update to a competing claimer is not an error:
    /// the scan simply moves on.  Returns `None` without blocking when no
    /// eligible job exists.
    pub fn claim_next(&self) -> Result<Option<PrintJob>> {
        let store = self.store.lock().expect("store lock poisoned");

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(candidate) = store.next_eligible(Utc::now())? else {
                return Ok(None);
            };

            match store.update(&candidate.id, JobUpdate::claim()) {
                Ok(()) => {
                    let claimed = store.get(&candidate.id)?;
                    debug!(job_id = %claimed.id, "job claimed");
                    return Ok(Some(claimed));
                }
                Err(ZettelwerkError::StaleWrite(id)) => {
                    debug!(job_id = %id, "lost claim race, rescanning");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(None)
    }

    /// Record a successful print: in_progress → completed.
    pub fn report_success(&self, job_id: &JobId) -> Result<()> {
        let store = self.store.lock().expect("store lock poisoned");
        let job = store.get(job_id)?;
        Self::ensure_in_progress(&job)?;

        let update = JobUpdate {
            expected_status: Some(JobStatus::InProgress),
            status: Some(JobStatus::Completed),
            ..JobUpdate::default()
        };
        Self::guarded_transition(&store, job_id, update)?;

        info!(job_id = %job_id, "job completed");
        Ok(())
    }

    /// Record a failed print: in_progress → pending (retries left) or
    /// in_progress → failed (retries exhausted).  Increments `attempts` and
    /// records the reason in `last_error` either way.
    pub fn report_failure(&self, job_id: &JobId, reason: &str) -> Result<()> {
        let store = self.store.lock().expect("store lock poisoned");
        let job = store.get(job_id)?;
        Self::ensure_in_progress(&job)?;

        let attempts = job.attempts + 1;
        if attempts >= job.max_attempts {
            let update = JobUpdate {
                expected_status: Some(JobStatus::InProgress),
                status: Some(JobStatus::Failed),
                attempts: Some(attempts),
                last_error: Some(reason.to_string()),
                ..JobUpdate::default()
            };
            Self::guarded_transition(&store, job_id, update)?;
            warn!(job_id = %job_id, attempts, reason, "job failed permanently");
        } else {
            let delay = self.retry.delay_for(attempts);
            let next_attempt_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            let update = JobUpdate {
                expected_status: Some(JobStatus::InProgress),
                status: Some(JobStatus::Pending),
                attempts: Some(attempts),
                last_error: Some(reason.to_string()),
                next_attempt_at: Some(Some(next_attempt_at)),
                ..JobUpdate::default()
            };
            Self::guarded_transition(&store, job_id, update)?;
            warn!(
                job_id = %job_id,
                attempts,
                max_attempts = job.max_attempts,
                reason,
                "print attempt failed, job requeued"
            );
        }
        Ok(())
    }

    // -- Read-only surface ---------------------------------------------------

    /// Snapshot of a single job.
    pub fn get_status(&self, job_id: &JobId) -> Result<PrintJob> {
        let store = self.store.lock().expect("store lock poisoned");
        store.get(job_id)
    }

    /// All jobs, optionally filtered by status, in claim order.
    pub fn list(&self, filter: Option<JobStatus>) -> Result<Vec<PrintJob>> {
        let store = self.store.lock().expect("store lock poisoned");
        store.query(filter)
    }

    /// Aggregate counters plus a coarse health signal.
    pub fn get_stats(&self) -> Result<QueueStats> {
        let store = self.store.lock().expect("store lock poisoned");
        let counts = store.counts_by_status()?;
        let last_24h = store.count_created_since(Utc::now() - chrono::Duration::hours(24))?;

        let backlog = counts.pending + counts.in_progress;
        Ok(QueueStats {
            pending: counts.pending,
            in_progress: counts.in_progress,
            completed: counts.completed,
            failed: counts.failed,
            total: counts.total(),
            last_24h,
            health: if backlog < BUSY_BACKLOG_THRESHOLD {
                "healthy".into()
            } else {
                "busy".into()
            },
        })
    }

    // -- Maintenance ---------------------------------------------------------

    /// Return jobs stranded in_progress by an unclean consumer shutdown to
    /// pending.  Called once at consumer startup, before the first poll.
    pub fn recover_abandoned(&self) -> Result<u32> {
        let store = self.store.lock().expect("store lock poisoned");
        let requeued = store.requeue_in_progress("requeued after unclean consumer shutdown")?;
        if requeued > 0 {
            warn!(requeued, "jobs abandoned by a previous consumer were requeued");
        }
        Ok(requeued)
    }

    /// Operator retention sweep: delete terminal jobs older than `days`.
    pub fn purge_older_than(&self, days: u32) -> Result<u64> {
        let store = self.store.lock().expect("store lock poisoned");
        store.purge_terminal_older_than(Utc::now() - chrono::Duration::days(i64::from(days)))
    }

    // -- Internals -----------------------------------------------------------

    fn resolve_max_attempts(&self, requested: Option<u32>) -> Result<u32> {
        match requested {
            Some(0) => Err(ZettelwerkError::Validation(
                "max_attempts must be at least 1".into(),
            )),
            Some(n) => Ok(n),
            None => Ok(self.default_max_attempts),
        }
    }

    fn ensure_in_progress(job: &PrintJob) -> Result<()> {
        if job.status != JobStatus::InProgress {
            return Err(ZettelwerkError::InvalidState {
                job: job.id,
                actual: job.status,
                required: JobStatus::InProgress,
            });
        }
        Ok(())
    }

    /// Apply a guarded transition, converting a lost race into the same
    /// `InvalidState` a stale pre-check would have produced.
    fn guarded_transition(store: &JobStore, job_id: &JobId, update: JobUpdate) -> Result<()> {
        match store.update(job_id, update) {
            Ok(()) => Ok(()),
            Err(ZettelwerkError::StaleWrite(_)) => {
                let current = store.get(job_id)?;
                Err(ZettelwerkError::InvalidState {
                    job: *job_id,
                    actual: current.status,
                    required: JobStatus::InProgress,
                })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_queue() -> TaskQueue {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        TaskQueue::new(store, &QueueConfig::default())
    }

    fn payload(title: &str) -> TaskPayload {
        TaskPayload::new(title)
    }

    #[test]
    fn enqueue_creates_pending_job_with_zero_attempts() {
        let queue = test_queue();
        let id = queue
            .enqueue(payload("write postcards"), TaskPriority::Medium, None)
            .expect("enqueue");

        let job = queue.get_status(&id).expect("status");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
    }

    #[test]
    fn enqueue_rejects_blank_title() {
        let queue = test_queue();
        let err = queue
            .enqueue(payload("  "), TaskPriority::High, None)
            .expect_err("must reject");
        assert!(matches!(err, ZettelwerkError::Validation(_)));
    }

    #[test]
    fn enqueue_rejects_zero_max_attempts() {
        let queue = test_queue();
        let err = queue
            .enqueue(payload("hopeless"), TaskPriority::High, Some(0))
            .expect_err("must reject");
        assert!(matches!(err, ZettelwerkError::Validation(_)));
    }

    #[test]
    fn oversized_batch_admits_nothing() {
        let queue = test_queue();
        let batch: Vec<NewJob> = (0..11)
            .map(|i| NewJob {
                payload: payload(&format!("task {i}")),
                priority: TaskPriority::Medium,
                max_attempts: None,
            })
            .collect();

        let err = queue.enqueue_batch(batch).expect_err("must reject");
        assert!(matches!(err, ZettelwerkError::Validation(_)));
        assert_eq!(queue.get_stats().expect("stats").total, 0);
    }

    #[test]
    fn invalid_entry_rejects_whole_batch() {
        let queue = test_queue();
        let batch = vec![
            NewJob {
                payload: payload("fine"),
                priority: TaskPriority::Medium,
                max_attempts: None,
            },
            NewJob {
                payload: payload(""),
                priority: TaskPriority::Medium,
                max_attempts: None,
            },
        ];

        assert!(queue.enqueue_batch(batch).is_err());
        assert_eq!(queue.get_stats().expect("stats").total, 0);
    }

    #[test]
    fn batch_at_cap_is_admitted() {
        let queue = test_queue();
        let batch: Vec<NewJob> = (0..10)
            .map(|i| NewJob {
                payload: payload(&format!("task {i}")),
                priority: TaskPriority::Low,
                max_attempts: None,
            })
            .collect();

        let ids = queue.enqueue_batch(batch).expect("admit");
        assert_eq!(ids.len(), 10);
        assert_eq!(queue.get_stats().expect("stats").pending, 10);
    }

    #[test]
    fn claim_next_on_empty_queue_is_none() {
        let queue = test_queue();
        assert!(queue.claim_next().expect("claim").is_none());
    }

    #[test]
    fn claimed_job_is_not_delivered_twice() {
        let queue = test_queue();
        queue
            .enqueue(payload("only one"), TaskPriority::High, None)
            .expect("enqueue");

        let first = queue.claim_next().expect("claim").expect("job");
        assert_eq!(first.status, JobStatus::InProgress);
        assert!(queue.claim_next().expect("claim").is_none());
    }

    #[test]
    fn report_success_requires_in_progress() {
        let queue = test_queue();
        let id = queue
            .enqueue(payload("not started"), TaskPriority::Medium, None)
            .expect("enqueue");

        let err = queue.report_success(&id).expect_err("must reject");
        assert!(matches!(
            err,
            ZettelwerkError::InvalidState {
                actual: JobStatus::Pending,
                ..
            }
        ));
        // The row is untouched.
        let job = queue.get_status(&id).expect("status");
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn report_failure_requires_in_progress() {
        let queue = test_queue();
        let id = queue
            .enqueue(payload("not started"), TaskPriority::Medium, None)
            .expect("enqueue");

        let err = queue
            .report_failure(&id, "phantom failure")
            .expect_err("must reject");
        assert!(matches!(err, ZettelwerkError::InvalidState { .. }));
        assert_eq!(
            queue.get_status(&id).expect("status").status,
            JobStatus::Pending
        );
    }

    #[test]
    fn failure_with_retries_left_requeues_and_counts() {
        let queue = test_queue();
        let id = queue
            .enqueue(payload("flaky"), TaskPriority::Medium, Some(3))
            .expect("enqueue");

        let job = queue.claim_next().expect("claim").expect("job");
        queue
            .report_failure(&job.id, "printer offline")
            .expect("report");

        let after = queue.get_status(&id).expect("status");
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 1);
        assert_eq!(after.last_error.as_deref(), Some("printer offline"));

        // With the default zero-delay policy it is immediately claimable.
        assert!(queue.claim_next().expect("claim").is_some());
    }

    #[test]
    fn last_failure_is_terminal() {
        let queue = test_queue();
        let id = queue
            .enqueue(payload("doomed"), TaskPriority::Medium, Some(1))
            .expect("enqueue");

        let job = queue.claim_next().expect("claim").expect("job");
        queue.report_failure(&job.id, "out of paper").expect("report");

        let after = queue.get_status(&id).expect("status");
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.attempts, 1);
        assert!(queue.claim_next().expect("claim").is_none());
    }

    #[test]
    fn stats_track_lifecycle_counts() {
        let queue = test_queue();
        for i in 0..3 {
            queue
                .enqueue(payload(&format!("job {i}")), TaskPriority::Medium, None)
                .expect("enqueue");
        }
        let job = queue.claim_next().expect("claim").expect("job");
        queue.report_success(&job.id).expect("report");

        let stats = queue.get_stats().expect("stats");
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.in_progress, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.last_24h, 3);
        assert_eq!(stats.health, "healthy");
    }

    #[test]
    fn recover_abandoned_requeues_in_progress_jobs() {
        let queue = test_queue();
        queue
            .enqueue(payload("interrupted"), TaskPriority::Medium, None)
            .expect("enqueue");
        let job = queue.claim_next().expect("claim").expect("job");

        assert_eq!(queue.recover_abandoned().expect("recover"), 1);
        let after = queue.get_status(&job.id).expect("status");
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 0);
    }
}
