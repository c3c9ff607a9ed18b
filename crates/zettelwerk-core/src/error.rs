// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Zettelwerk.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Top-level error type for all Zettelwerk operations.
#[derive(Debug, Error)]
pub enum ZettelwerkError {
    // -- Admission --
    #[error("invalid request: {0}")]
    Validation(String),

    // -- Queue state machine --
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    Conflict(JobId),

    #[error("job {job} is {actual}, operation requires {required}")]
    InvalidState {
        job: JobId,
        actual: JobStatus,
        required: JobStatus,
    },

    /// A status-guarded update found the row in a different state than the
    /// caller expected — the caller lost a claim race.
    #[error("stale write on job {0}: status precondition no longer holds")]
    StaleWrite(JobId),

    // -- Print capability --
    #[error("print failed: {0}")]
    PrintFailed(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ZettelwerkError>;
