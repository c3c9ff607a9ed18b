// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The print capability consumed by the worker.
//
// The queue treats printing as an opaque, possibly slow call that either
// succeeds or fails with a reason.  Two implementations ship in-tree: a
// simulator for development and tests, and a raw TCP sink for thermal
// printers that accept plain text on the JetDirect port.  Anything richer
// (image rendering, Bluetooth pairing) belongs to an external driver.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use zettelwerk_core::error::{Result, ZettelwerkError};
use zettelwerk_core::types::{PrintJob, TaskPriority};

/// Card width in characters, sized for 58 mm thermal paper.
const CARD_WIDTH: usize = 32;

/// Timeout for connecting to the raw TCP printer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One print attempt for one claimed job.
#[async_trait]
pub trait CardPrinter: Send + Sync {
    async fn print(&self, job: &PrintJob) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// No-device print capability: logs the card and sleeps for a
/// priority-scaled interval, mimicking the pacing of a real thermal print.
///
/// Failure injection is deterministic (every nth call fails) so retry paths
/// can be exercised without a flaky device or a rand dependency.
pub struct SimulatedPrinter {
    /// One unit of simulated print time; the per-priority multiplier is
    /// applied on top.  Zero makes the simulator instantaneous for tests.
    delay_unit: Duration,
    /// When set to n, every nth print call fails.
    fail_every_nth: Option<u32>,
    printed: AtomicU32,
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self {
            delay_unit: Duration::from_secs(1),
            fail_every_nth: None,
            printed: AtomicU32::new(0),
        }
    }
}

impl SimulatedPrinter {
    pub fn new(delay_unit: Duration) -> Self {
        Self {
            delay_unit,
            ..Self::default()
        }
    }

    /// Make every nth print call fail (n >= 1; 1 fails every call).
    pub fn with_failure_every(mut self, nth: u32) -> Self {
        self.fail_every_nth = Some(nth.max(1));
        self
    }

    /// Higher-priority cards are shorter, so they print faster.
    fn print_time(&self, priority: TaskPriority) -> Duration {
        let multiplier = match priority {
            TaskPriority::High => 2,
            TaskPriority::Medium => 3,
            TaskPriority::Low => 4,
        };
        self.delay_unit * multiplier
    }
}

#[async_trait]
impl CardPrinter for SimulatedPrinter {
    async fn print(&self, job: &PrintJob) -> Result<()> {
        info!(
            job_id = %job.id,
            title = %job.payload.title,
            priority = %job.priority,
            category = %job.payload.category,
            "simulating print"
        );

        tokio::time::sleep(self.print_time(job.priority)).await;

        let count = self.printed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(nth) = self.fail_every_nth
            && count % nth == 0
        {
            return Err(ZettelwerkError::PrintFailed(
                "simulated device fault (injected)".into(),
            ));
        }

        debug!(job_id = %job.id, "simulated print complete");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw TCP sink
// ---------------------------------------------------------------------------

/// Plain-text card sink over raw TCP (JetDirect, port 9100).
///
/// The simplest transport a thermal printer speaks: open a socket, dump the
/// card text, close.  No job tracking, no feedback beyond socket errors —
/// the printer must accept plain text natively.
pub struct RawTcpPrinter {
    /// Printer address as host:port.
    addr: String,
}

impl RawTcpPrinter {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl CardPrinter for RawTcpPrinter {
    async fn print(&self, job: &PrintJob) -> Result<()> {
        let card = format_card(job);
        debug!(addr = %self.addr, bytes = card.len(), "connecting to printer");

        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                ZettelwerkError::PrintFailed(format!(
                    "connection to {} timed out after {}s",
                    self.addr,
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| ZettelwerkError::PrintFailed(format!("connect to {}: {e}", self.addr)))?;

        stream
            .write_all(card.as_bytes())
            .await
            .map_err(|e| ZettelwerkError::PrintFailed(format!("send card: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| ZettelwerkError::PrintFailed(format!("flush: {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| ZettelwerkError::PrintFailed(format!("shutdown: {e}")))?;

        info!(job_id = %job.id, addr = %self.addr, "card sent to printer");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Card layout
// ---------------------------------------------------------------------------

/// Render a job as a fixed-width plain-text card.
pub fn format_card(job: &PrintJob) -> String {
    let heavy = "=".repeat(CARD_WIDTH);
    let light = "-".repeat(CARD_WIDTH);
    let short_id: String = job.id.to_string().chars().take(8).collect();

    let mut card = String::new();
    let _ = writeln!(card, "{heavy}");
    let _ = writeln!(card, " TASK  #{}", short_id.to_uppercase());
    let _ = writeln!(card, "{heavy}");
    let _ = writeln!(card, " {}", job.payload.title);
    let _ = writeln!(
        card,
        " priority: {} | {}",
        job.priority, job.payload.category
    );

    if let Some(description) = &job.payload.description {
        let _ = writeln!(card, "{light}");
        let _ = writeln!(card, " {description}");
    }

    if job.payload.estimated_time.is_some() || job.payload.due_date.is_some() {
        let _ = writeln!(card, "{light}");
        if let Some(estimate) = &job.payload.estimated_time {
            let _ = writeln!(card, " est: {estimate}");
        }
        if let Some(due) = &job.payload.due_date {
            let _ = writeln!(card, " due: {}", due.format("%Y-%m-%d %H:%M"));
        }
    }

    let _ = writeln!(card, "{heavy}");
    // Trailing feed so the card clears the tear bar.
    card.push_str("\n\n\n");
    card
}
