// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent job store backed by SQLite.
//
// The store holds one row per print job and survives process restarts on
// both sides of the queue: the producer CLI and the consumer daemon open
// the same database file.  All writes are single-row and atomic; claiming
// is built on status-guarded conditional updates, so the store never needs
// multi-row transactions except for all-or-nothing batch admission.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, params_from_iter, types::ToSql};
use tracing::{debug, info};

use zettelwerk_core::error::{Result, ZettelwerkError};
use zettelwerk_core::types::{JobId, JobStatus, PrintJob, TaskPayload, TaskPriority};

/// SQLite schema for the jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        priority TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_error TEXT,
        next_attempt_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
    CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
    CREATE INDEX IF NOT EXISTS idx_jobs_priority ON jobs(priority);
"#;

/// Migration to add the retry-eligibility column to existing databases.
const MIGRATE_NEXT_ATTEMPT_SQL: &str = r#"
    ALTER TABLE jobs ADD COLUMN next_attempt_at TEXT;
"#;

/// Column list shared by every SELECT; `row_to_job` indexes into this order.
const JOB_COLUMNS: &str =
    "id, payload, priority, status, attempts, max_attempts, created_at, updated_at, \
     last_error, next_attempt_at";

/// Claim ordering: priority rank, then admission order, then id as the final
/// tie-break.
const PRIORITY_RANK_SQL: &str =
    "CASE priority WHEN 'high' THEN 3 WHEN 'medium' THEN 2 WHEN 'low' THEN 1 ELSE 0 END";

/// How long a writer waits on a lock held by the other process before the
/// statement fails.  WAL keeps readers out of this path entirely.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Partial mutation applied to a job row in one atomic UPDATE.
///
/// `expected_status` turns the update into a compare-and-swap on the status
/// column: if the row exists but is no longer in the expected state, the
/// update affects zero rows and surfaces as `StaleWrite`.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub expected_status: Option<JobStatus>,
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub last_error: Option<String>,
    /// `Some(None)` clears the column, `Some(Some(t))` sets it.
    pub next_attempt_at: Option<Option<DateTime<Utc>>>,
    /// Additionally require `attempts < max_attempts` (the claim guard).
    pub require_attempts_below_max: bool,
}

impl JobUpdate {
    /// The claim transition: pending → in_progress, guarded on both the
    /// status and the attempt ceiling.
    pub fn claim() -> Self {
        Self {
            expected_status: Some(JobStatus::Pending),
            status: Some(JobStatus::InProgress),
            require_attempts_below_max: true,
            ..Self::default()
        }
    }
}

/// Counts of jobs per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

/// Persistent job store backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively; every operation is a short single-statement query, so callers
/// on the async side hold the wrapping mutex only briefly.
pub struct JobStore {
    /// The open SQLite connection.
    conn: Connection,
}

impl JobStore {
    /// Open (or create) the job database at the given path.
    ///
    /// Applies WAL journal mode so the producer process can keep reading
    /// while the consumer writes, sets a busy timeout for the rare
    /// writer-vs-writer collision, and creates the `jobs` table if needed.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| ZettelwerkError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ZettelwerkError::Database(format!("WAL pragma: {e}")))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| ZettelwerkError::Database(format!("busy timeout: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| ZettelwerkError::Database(format!("create table: {e}")))?;

        Self::migrate(&conn);

        info!(path = %path.as_ref().display(), "job database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ZettelwerkError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| ZettelwerkError::Database(format!("create table: {e}")))?;

        debug!("in-memory job database opened");
        Ok(Self { conn })
    }

    /// Apply additive column migrations to databases created by earlier
    /// versions.  Silently skips statements whose column already exists.
    fn migrate(conn: &Connection) {
        for stmt in MIGRATE_NEXT_ATTEMPT_SQL.split(';') {
            let trimmed = stmt.trim();
            if trimmed.is_empty() {
                continue;
            }
            if conn.execute_batch(trimmed).is_err() {
                // Column already exists — expected on current databases.
            }
        }
    }

    /// Insert a new job row.
    ///
    /// Fails with `Conflict` if a row with the same id already exists.
    pub fn insert(&self, job: &PrintJob) -> Result<()> {
        let payload_json = serde_json::to_string(&job.payload)?;

        self.conn
            .execute(
                "INSERT INTO jobs (id, payload, priority, status, attempts, max_attempts,
                 created_at, updated_at, last_error, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    job.id.to_string(),
                    payload_json,
                    job.priority.as_str(),
                    job.status.as_str(),
                    job.attempts,
                    job.max_attempts,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    job.last_error,
                    job.next_attempt_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ZettelwerkError::Conflict(job.id)
                }
                other => ZettelwerkError::Database(format!("insert job: {other}")),
            })?;

        debug!(job_id = %job.id, priority = %job.priority, "job row inserted");
        Ok(())
    }

    /// Insert several jobs in one transaction — either all rows land or none
    /// do.  Backs all-or-nothing batch admission.
    pub fn insert_batch(&mut self, jobs: &[PrintJob]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| ZettelwerkError::Database(format!("begin batch: {e}")))?;

        for job in jobs {
            let payload_json = serde_json::to_string(&job.payload)?;
            tx.execute(
                "INSERT INTO jobs (id, payload, priority, status, attempts, max_attempts,
                 created_at, updated_at, last_error, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    job.id.to_string(),
                    payload_json,
                    job.priority.as_str(),
                    job.status.as_str(),
                    job.attempts,
                    job.max_attempts,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    job.last_error,
                    job.next_attempt_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ZettelwerkError::Conflict(job.id)
                }
                other => ZettelwerkError::Database(format!("insert batch row: {other}")),
            })?;
        }

        tx.commit()
            .map_err(|e| ZettelwerkError::Database(format!("commit batch: {e}")))?;

        info!(count = jobs.len(), "batch of jobs inserted");
        Ok(())
    }

    /// Retrieve a single job by id.
    pub fn get(&self, job_id: &JobId) -> Result<PrintJob> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        self.conn
            .query_row(&sql, params![job_id.to_string()], row_to_job)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ZettelwerkError::NotFound(*job_id),
                other => ZettelwerkError::Database(format!("get job: {other}")),
            })
    }

    /// Apply a partial mutation atomically.
    ///
    /// Always refreshes `updated_at`.  With an `expected_status` guard, a
    /// zero-row update on an existing row means the precondition no longer
    /// holds and surfaces as `StaleWrite`; an absent row is `NotFound`.
    pub fn update(&self, job_id: &JobId, update: JobUpdate) -> Result<()> {
        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(Utc::now().to_rfc3339())];

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(attempts) = update.attempts {
            sets.push("attempts = ?");
            values.push(Box::new(attempts));
        }
        if let Some(last_error) = update.last_error {
            sets.push("last_error = ?");
            values.push(Box::new(last_error));
        }
        if let Some(next_attempt_at) = update.next_attempt_at {
            sets.push("next_attempt_at = ?");
            values.push(Box::new(next_attempt_at.map(|t| t.to_rfc3339())));
        }

        let mut sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
        values.push(Box::new(job_id.to_string()));

        if let Some(expected) = update.expected_status {
            sql.push_str(" AND status = ?");
            values.push(Box::new(expected.as_str()));
        }
        if update.require_attempts_below_max {
            sql.push_str(" AND attempts < max_attempts");
        }

        let rows = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| ZettelwerkError::Database(format!("update job: {e}")))?;

        if rows == 0 {
            return if self.exists(job_id)? {
                Err(ZettelwerkError::StaleWrite(*job_id))
            } else {
                Err(ZettelwerkError::NotFound(*job_id))
            };
        }

        debug!(job_id = %job_id, "job row updated");
        Ok(())
    }

    /// All jobs matching a status filter (or all jobs), in claim order.
    /// Restartable: each call re-issues the scan against current state.
    pub fn query(&self, filter: Option<JobStatus>) -> Result<Vec<PrintJob>> {
        let order = format!("{PRIORITY_RANK_SQL} DESC, created_at ASC, id ASC");
        let (sql, filter_str) = match filter {
            Some(status) => (
                format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY {order}"),
                Some(status.as_str()),
            ),
            None => (
                format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY {order}"),
                None,
            ),
        };

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| ZettelwerkError::Database(format!("prepare query: {e}")))?;

        let rows = match filter_str {
            Some(s) => stmt.query_map(params![s], row_to_job),
            None => stmt.query_map([], row_to_job),
        }
        .map_err(|e| ZettelwerkError::Database(format!("query jobs: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ZettelwerkError::Database(format!("collect rows: {e}")))
    }

    /// The next job a consumer may claim, as of `now`: pending, below its
    /// attempt ceiling, and past any retry delay.  Highest priority first,
    /// FIFO within a priority.
    pub fn next_eligible(&self, now: DateTime<Utc>) -> Result<Option<PrintJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE status = 'pending'
               AND attempts < max_attempts
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
             ORDER BY {PRIORITY_RANK_SQL} DESC, created_at ASC, id ASC
             LIMIT 1"
        );

        match self
            .conn
            .query_row(&sql, params![now.to_rfc3339()], row_to_job)
        {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ZettelwerkError::Database(format!("next eligible: {e}"))),
        }
    }

    /// Counts per lifecycle state, from an indexed scan.
    pub fn counts_by_status(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .map_err(|e| ZettelwerkError::Database(format!("prepare counts: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| ZettelwerkError::Database(format!("query counts: {e}")))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) =
                row.map_err(|e| ZettelwerkError::Database(format!("count row: {e}")))?;
            let n = n as u64;
            match status.as_str() {
                "pending" => counts.pending = n,
                "in_progress" => counts.in_progress = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Number of jobs admitted at or after `cutoff`.
    pub fn count_created_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE created_at >= ?1",
                params![cutoff.to_rfc3339()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| ZettelwerkError::Database(format!("count recent: {e}")))
    }

    /// Return every in_progress row to pending.
    ///
    /// Only meaningful at consumer startup: under the single-worker
    /// deployment, an in_progress row seen before the loop starts belongs to
    /// a consumer that died mid-print.  Attempts are left untouched — the
    /// outcome of the interrupted attempt is unknown.
    pub fn requeue_in_progress(&self, note: &str) -> Result<u32> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'pending', updated_at = ?1, last_error = ?2
                 WHERE status = 'in_progress'",
                params![now, note],
            )
            .map_err(|e| ZettelwerkError::Database(format!("requeue in_progress: {e}")))?;
        Ok(rows as u32)
    }

    /// Delete terminal rows older than `cutoff`.  Retention is operator
    /// policy — the queue core never calls this.
    pub fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM jobs
                 WHERE status IN ('completed', 'failed') AND created_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .map_err(|e| ZettelwerkError::Database(format!("purge jobs: {e}")))?;

        if rows > 0 {
            info!(purged = rows, "old terminal jobs purged");
        }
        Ok(rows as u64)
    }

    fn exists(&self, job_id: &JobId) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(ZettelwerkError::Database(format!("exists: {other}"))),
            })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `PrintJob`.
///
/// Column indices must match `JOB_COLUMNS`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintJob> {
    let id_str: String = row.get(0)?;
    let payload_json: String = row.get(1)?;
    let priority_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let attempts: u32 = row.get::<_, i64>(4)? as u32;
    let max_attempts: u32 = row.get::<_, i64>(5)? as u32;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;
    let last_error: Option<String> = row.get(8)?;
    let next_attempt_str: Option<String> = row.get(9)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let payload: TaskPayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let priority: TaskPriority = priority_str.parse().map_err(|e: ZettelwerkError| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status: JobStatus = status_str.parse().map_err(|e: ZettelwerkError| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = parse_rfc3339(&created_at_str, 6)?;
    let updated_at = parse_rfc3339(&updated_at_str, 7)?;
    let next_attempt_at = match next_attempt_str {
        Some(s) => Some(parse_rfc3339(&s, 9)?),
        None => None,
    };

    Ok(PrintJob {
        id: JobId(uuid),
        payload,
        priority,
        status,
        attempts,
        max_attempts,
        created_at,
        updated_at,
        last_error,
        next_attempt_at,
    })
}

fn parse_rfc3339(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use zettelwerk_core::types::TaskCategory;

    /// Helper: create a minimal test job.
    fn test_job(title: &str, priority: TaskPriority) -> PrintJob {
        PrintJob::new(TaskPayload::new(title), priority, 3)
    }

    #[test]
    fn insert_and_retrieve_job() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job("buy stamps", TaskPriority::Medium);
        job.payload.description = Some("the self-adhesive kind".into());
        job.payload.category = TaskCategory::Personal;
        store.insert(&job).expect("insert");

        let retrieved = store.get(&job.id).expect("get");
        assert_eq!(retrieved.id, job.id);
        assert_eq!(retrieved.payload.title, "buy stamps");
        assert_eq!(
            retrieved.payload.description.as_deref(),
            Some("the self-adhesive kind")
        );
        assert_eq!(retrieved.payload.category, TaskCategory::Personal);
        assert_eq!(retrieved.status, JobStatus::Pending);
        assert_eq!(retrieved.attempts, 0);
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job("duplicate me", TaskPriority::Low);
        store.insert(&job).expect("first insert");

        let err = store.insert(&job).expect_err("second insert must fail");
        assert!(matches!(err, ZettelwerkError::Conflict(id) if id == job.id));
    }

    #[test]
    fn get_missing_job_is_not_found() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let id = JobId::new();
        let err = store.get(&id).expect_err("must fail");
        assert!(matches!(err, ZettelwerkError::NotFound(missing) if missing == id));
    }

    #[test]
    fn guarded_update_on_wrong_status_is_stale() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job("guarded", TaskPriority::Medium);
        store.insert(&job).expect("insert");

        // Claim succeeds once...
        store.update(&job.id, JobUpdate::claim()).expect("claim");

        // ...and the same guarded transition then loses.
        let err = store
            .update(&job.id, JobUpdate::claim())
            .expect_err("second claim must fail");
        assert!(matches!(err, ZettelwerkError::StaleWrite(id) if id == job.id));
    }

    #[test]
    fn update_missing_job_is_not_found() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let err = store
            .update(&JobId::new(), JobUpdate::claim())
            .expect_err("must fail");
        assert!(matches!(err, ZettelwerkError::NotFound(_)));
    }

    #[test]
    fn update_refreshes_updated_at() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job("timestamps", TaskPriority::Medium);
        job.updated_at = Utc::now() - ChronoDuration::hours(1);
        store.insert(&job).expect("insert");

        store.update(&job.id, JobUpdate::claim()).expect("claim");
        let after = store.get(&job.id).expect("get");
        assert!(after.updated_at > job.updated_at);
    }

    #[test]
    fn eligibility_order_is_priority_then_fifo() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let t0 = Utc::now() - ChronoDuration::seconds(30);

        let mut a = test_job("a", TaskPriority::Low);
        a.created_at = t0 + ChronoDuration::seconds(1);
        let mut b = test_job("b", TaskPriority::High);
        b.created_at = t0 + ChronoDuration::seconds(2);
        let mut c = test_job("c", TaskPriority::High);
        c.created_at = t0;

        for job in [&a, &b, &c] {
            store.insert(job).expect("insert");
        }

        let mut order = Vec::new();
        while let Some(next) = store.next_eligible(Utc::now()).expect("scan") {
            order.push(next.payload.title.clone());
            store.update(&next.id, JobUpdate::claim()).expect("claim");
        }
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn retry_delay_gates_eligibility() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job("delayed", TaskPriority::High);
        job.next_attempt_at = Some(Utc::now() + ChronoDuration::hours(1));
        store.insert(&job).expect("insert");

        assert!(store.next_eligible(Utc::now()).expect("scan").is_none());

        let later = Utc::now() + ChronoDuration::hours(2);
        let eligible = store.next_eligible(later).expect("scan");
        assert_eq!(eligible.expect("eligible").id, job.id);
    }

    #[test]
    fn job_at_attempt_ceiling_is_not_eligible() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job("worn out", TaskPriority::High);
        job.attempts = 3;
        store.insert(&job).expect("insert");

        assert!(store.next_eligible(Utc::now()).expect("scan").is_none());
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let mut store = JobStore::open_in_memory().expect("open in-memory db");
        let first = test_job("one", TaskPriority::Medium);
        let mut clash = test_job("two", TaskPriority::Medium);
        clash.id = first.id; // forces a constraint violation mid-batch

        let err = store
            .insert_batch(&[first, clash])
            .expect_err("batch must fail");
        assert!(matches!(err, ZettelwerkError::Conflict(_)));
        assert_eq!(store.counts_by_status().expect("counts").total(), 0);
    }

    #[test]
    fn counts_by_status_reflect_rows() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        for _ in 0..3 {
            store
                .insert(&test_job("p", TaskPriority::Medium))
                .expect("insert");
        }
        let claimed = store.next_eligible(Utc::now()).expect("scan").expect("job");
        store.update(&claimed.id, JobUpdate::claim()).expect("claim");

        let counts = store.counts_by_status().expect("counts");
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn requeue_returns_abandoned_jobs_to_pending() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job("abandoned", TaskPriority::Medium);
        store.insert(&job).expect("insert");
        store.update(&job.id, JobUpdate::claim()).expect("claim");

        let requeued = store
            .requeue_in_progress("requeued after unclean shutdown")
            .expect("requeue");
        assert_eq!(requeued, 1);

        let after = store.get(&job.id).expect("get");
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 0);
        assert!(after.last_error.is_some());
    }

    #[test]
    fn purge_removes_only_old_terminal_rows() {
        let store = JobStore::open_in_memory().expect("open in-memory db");

        let mut done_old = test_job("done old", TaskPriority::Medium);
        done_old.status = JobStatus::Completed;
        done_old.created_at = Utc::now() - ChronoDuration::days(30);
        let mut done_new = test_job("done new", TaskPriority::Medium);
        done_new.status = JobStatus::Completed;
        let pending_old = {
            let mut j = test_job("pending old", TaskPriority::Medium);
            j.created_at = Utc::now() - ChronoDuration::days(30);
            j
        };

        for job in [&done_old, &done_new, &pending_old] {
            store.insert(job).expect("insert");
        }

        let cutoff = Utc::now() - ChronoDuration::days(7);
        let purged = store.purge_terminal_older_than(cutoff).expect("purge");
        assert_eq!(purged, 1);
        assert!(store.get(&done_old.id).is_err());
        assert!(store.get(&done_new.id).is_ok());
        assert!(store.get(&pending_old.id).is_ok());
    }

    #[test]
    fn query_filters_by_status() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        store
            .insert(&test_job("p1", TaskPriority::Medium))
            .expect("insert");
        let claimed = store.next_eligible(Utc::now()).expect("scan").expect("job");
        store.update(&claimed.id, JobUpdate::claim()).expect("claim");
        store
            .insert(&test_job("p2", TaskPriority::Medium))
            .expect("insert");

        assert_eq!(store.query(Some(JobStatus::Pending)).expect("query").len(), 1);
        assert_eq!(
            store
                .query(Some(JobStatus::InProgress))
                .expect("query")
                .len(),
            1
        );
        assert_eq!(store.query(None).expect("query").len(), 2);
    }
}
