// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface of the `zettelwerk` binary.
//
// The same binary serves both sides of the queue: `run` starts the consumer
// daemon, everything else is a short-lived producer or operator command
// against the shared database.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "zettelwerk",
    version,
    about = "Durable task-card print spooler",
    long_about = "Producer commands enqueue task cards into a durable queue; \
                  `run` starts the consumer daemon that claims jobs and drives \
                  them to the thermal printer (or the simulator). \
                  Configuration comes from ZETTELWERK_* environment variables."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the consumer daemon until interrupted.
    Run,

    /// Enqueue a single task card.
    Enqueue {
        /// Task title (required, non-empty).
        #[arg(long)]
        title: String,

        /// Free-form description printed below the title.
        #[arg(long)]
        description: Option<String>,

        /// One of: high, medium, low.
        #[arg(long, default_value = "medium")]
        priority: String,

        /// One of: work, personal, urgent, learning, health, other.
        #[arg(long, default_value = "other")]
        category: String,

        /// Estimated time to complete, e.g. "30m".
        #[arg(long)]
        estimated_time: Option<String>,

        /// Due date, RFC 3339 (e.g. 2026-08-14T17:00:00Z).
        #[arg(long)]
        due_date: Option<String>,

        /// Attempt ceiling for this job (defaults to the configured value).
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Enqueue a batch of task cards from a JSON file, all or nothing.
    Batch {
        /// Path to a JSON array of jobs: [{"payload": {...}, "priority": "..."}].
        file: PathBuf,
    },

    /// Show one job as JSON.
    Status {
        /// Job id as printed by enqueue.
        job_id: String,
    },

    /// Show aggregate queue counters as JSON.
    Stats,

    /// List jobs in claim order, optionally filtered by status.
    Jobs {
        /// One of: pending, in_progress, completed, failed.
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete completed/failed jobs older than the given age.
    Purge {
        /// Age threshold in days.
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}
