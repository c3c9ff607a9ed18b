// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Zettelwerk Queue — durable SQLite job store, the queue state machine, the
// retry policy, and the consumer worker that drives claimed jobs to the
// print capability.  This crate bridges between the core domain types
// defined in `zettelwerk-core` and the actual spooling machinery.

pub mod printer;
pub mod queue;
pub mod retry;
pub mod store;
pub mod worker;

pub use printer::{CardPrinter, RawTcpPrinter, SimulatedPrinter};
pub use queue::TaskQueue;
pub use retry::RetryPolicy;
pub use store::{JobStore, JobUpdate};
pub use worker::PrintWorker;
