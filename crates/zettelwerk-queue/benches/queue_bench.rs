// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Benchmarks for queue admission and the claim/report cycle.

use criterion::{Criterion, criterion_group, criterion_main};

use zettelwerk_core::QueueConfig;
use zettelwerk_core::types::{TaskPayload, TaskPriority};
use zettelwerk_queue::{JobStore, TaskQueue};

fn bench_enqueue(c: &mut Criterion) {
    let store = JobStore::open_in_memory().expect("open in-memory db");
    let queue = TaskQueue::new(store, &QueueConfig::default());

    c.bench_function("enqueue", |b| {
        b.iter(|| {
            queue
                .enqueue(
                    TaskPayload::new("benchmark card"),
                    TaskPriority::Medium,
                    None,
                )
                .expect("enqueue")
        })
    });
}

fn bench_claim_and_complete(c: &mut Criterion) {
    let store = JobStore::open_in_memory().expect("open in-memory db");
    let queue = TaskQueue::new(store, &QueueConfig::default());

    c.bench_function("claim_and_complete", |b| {
        b.iter(|| {
            let id = queue
                .enqueue(
                    TaskPayload::new("benchmark card"),
                    TaskPriority::Medium,
                    None,
                )
                .expect("enqueue");
            let job = queue.claim_next().expect("claim").expect("job");
            assert_eq!(job.id, id);
            queue.report_success(&job.id).expect("report");
        })
    });
}

criterion_group!(benches, bench_enqueue, bench_claim_and_complete);
criterion_main!(benches);
