// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Zettelwerk — task-card print spooler.
//
// Entry point.  Initialises logging, loads configuration from the
// environment, and dispatches to the consumer daemon or one of the
// short-lived producer/operator commands.

mod args;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, info};

use zettelwerk_core::error::{Result, ZettelwerkError};
use zettelwerk_core::types::{JobId, JobStatus, NewJob, TaskPayload};
use zettelwerk_core::QueueConfig;
use zettelwerk_queue::{
    CardPrinter, JobStore, PrintWorker, RawTcpPrinter, SimulatedPrinter, TaskQueue,
};

use args::{Args, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = QueueConfig::from_env();

    if let Err(e) = dispatch(args, config).await {
        error!(error = %e, "zettelwerk failed");
        std::process::exit(1);
    }
}

async fn dispatch(args: Args, config: QueueConfig) -> Result<()> {
    match args.command {
        Command::Run => run_daemon(config).await,

        Command::Enqueue {
            title,
            description,
            priority,
            category,
            estimated_time,
            due_date,
            max_attempts,
        } => {
            let payload = TaskPayload {
                title,
                description,
                category: category.parse()?,
                estimated_time,
                due_date: due_date.as_deref().map(parse_due_date).transpose()?,
            };
            let queue = open_queue(&config)?;
            let id = queue.enqueue(payload, priority.parse()?, max_attempts)?;
            println!("{id}");
            Ok(())
        }

        Command::Batch { file } => {
            let data = std::fs::read_to_string(&file)?;
            let batch: Vec<NewJob> = serde_json::from_str(&data)?;
            let queue = open_queue(&config)?;
            let ids = queue.enqueue_batch(batch)?;
            for id in &ids {
                println!("{id}");
            }
            info!(count = ids.len(), "batch enqueued");
            Ok(())
        }

        Command::Status { job_id } => {
            let queue = open_queue(&config)?;
            let job = queue.get_status(&JobId::parse(&job_id)?)?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }

        Command::Stats => {
            let queue = open_queue(&config)?;
            let stats = queue.get_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Command::Jobs { status } => {
            let filter: Option<JobStatus> = status.as_deref().map(str::parse).transpose()?;
            let queue = open_queue(&config)?;
            let jobs = queue.list(filter)?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }

        Command::Purge { days } => {
            let queue = open_queue(&config)?;
            let purged = queue.purge_older_than(days)?;
            println!("purged {purged} job(s) older than {days} day(s)");
            Ok(())
        }
    }
}

/// Open the shared database and wrap it in the queue API.  The connection
/// lives for the whole process and is released when the queue is dropped.
fn open_queue(config: &QueueConfig) -> Result<TaskQueue> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = JobStore::open(&config.db_path)?;
    Ok(TaskQueue::new(store, config))
}

/// Run the consumer loop until SIGINT.
async fn run_daemon(config: QueueConfig) -> Result<()> {
    info!(
        db = %config.db_path.display(),
        poll_interval_secs = config.poll_interval_secs,
        simulation = config.simulate,
        "starting print spooler"
    );

    let printer: Arc<dyn CardPrinter> = if config.simulate {
        info!("simulation mode — no card leaves the building");
        Arc::new(SimulatedPrinter::default())
    } else {
        let addr = config.printer_addr.clone().ok_or_else(|| {
            ZettelwerkError::Validation(
                "no printer configured: set ZETTELWERK_PRINTER_ADDR or ZETTELWERK_SIMULATION=true"
                    .into(),
            )
        })?;
        info!(printer = %addr, "using raw TCP printer");
        Arc::new(RawTcpPrinter::new(addr))
    };

    let queue = open_queue(&config)?;
    let worker = PrintWorker::new(queue, printer, config.poll_interval());
    let handle = worker.handle();

    let join = tokio::spawn(async move { worker.run().await });

    tokio::signal::ctrl_c().await.map_err(ZettelwerkError::Io)?;
    info!("shutdown signal received");
    handle.stop();
    join.await
        .map_err(|e| ZettelwerkError::Database(format!("worker task panicked: {e}")))?;

    Ok(())
}

/// Parse a producer-supplied due date, surfacing a validation error rather
/// than a panic on malformed input.
fn parse_due_date(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ZettelwerkError::Validation(format!("due date must be RFC 3339: {e}")))
}
