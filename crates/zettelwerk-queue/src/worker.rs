// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The consumer loop: claim the next job, hand it to the print capability,
// record the outcome, repeat.
//
// While claims keep yielding work the loop runs tight; once the queue is
// drained it sleeps for the poll interval.  A store hiccup is logged and
// absorbed with the same poll backoff — one bad job or one failed query
// never terminates the loop.  Shutdown is cooperative: the handle sets a
// flag and rings a notify, and the loop exits between jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use zettelwerk_core::error::Result;
use zettelwerk_core::types::PrintJob;

use crate::printer::CardPrinter;
use crate::queue::TaskQueue;

/// Handle for stopping a running worker from another task.
#[derive(Clone)]
pub struct WorkerHandle {
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Request a graceful stop.  The worker finishes the job it is printing
    /// (a claimed job is owned until its outcome is reported) and exits.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

/// The polling print worker.
pub struct PrintWorker {
    queue: TaskQueue,
    printer: Arc<dyn CardPrinter>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
}

impl PrintWorker {
    pub fn new(queue: TaskQueue, printer: Arc<dyn CardPrinter>, poll_interval: Duration) -> Self {
        Self {
            queue,
            printer,
            poll_interval,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shutdown: Arc::clone(&self.shutdown),
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Run until the handle requests a stop.
    ///
    /// Startup first requeues jobs stranded in_progress by an unclean
    /// shutdown, then reports the backlog it is starting with.
    pub async fn run(&self) {
        match self.queue.recover_abandoned() {
            Ok(_) => {}
            Err(e) => error!(error = %e, "startup recovery failed"),
        }
        match self.queue.get_stats() {
            Ok(stats) => info!(
                pending = stats.pending,
                completed = stats.completed,
                failed = stats.failed,
                "print worker starting"
            ),
            Err(e) => error!(error = %e, "could not read queue stats at startup"),
        }

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            match self.process_available().await {
                Ok(0) => {}
                Ok(n) => debug!(processed = n, "drained available work"),
                Err(e) => error!(error = %e, "store unavailable, backing off"),
            }

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("print worker stopped");
    }

    /// Claim and process jobs until the queue is empty or a stop is
    /// requested.  Returns the number of jobs processed.
    async fn process_available(&self) -> Result<u64> {
        let mut processed = 0;
        while !self.stopping.load(Ordering::SeqCst) {
            let Some(job) = self.queue.claim_next()? else {
                break;
            };
            self.process(job).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// One claimed job: print, then record the outcome.  Reporting failures
    /// are logged rather than propagated — the job stays visible in the
    /// store either way.
    async fn process(&self, job: PrintJob) {
        info!(job_id = %job.id, title = %job.payload.title, "processing job");

        match self.printer.print(&job).await {
            Ok(()) => {
                if let Err(e) = self.queue.report_success(&job.id) {
                    error!(job_id = %job.id, error = %e, "could not record success");
                }
            }
            Err(e) => {
                let reason = e.to_string();
                if let Err(report_err) = self.queue.report_failure(&job.id, &reason) {
                    error!(job_id = %job.id, error = %report_err, "could not record failure");
                }
            }
        }
    }
}
