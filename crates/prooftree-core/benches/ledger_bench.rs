//! Criterion benchmarks for the ledger append/fold hot path.
//!
//! Covers: sequential append throughput and full-history fold cost, the two
//! operations every command pays on every invocation (spec §5: each command
//! is fold-then-validate-then-append).

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use prooftree_core::config::Config;
use prooftree_core::events::{Envelope, EventPayload, NewNode};
use prooftree_core::ledger::Ledger;
use prooftree_core::state::State;

fn node_created(seq: u64) -> Envelope<EventPayload> {
    Envelope {
        timestamp: prooftree_core::ids::now_utc(),
        seq: 0,
        payload: EventPayload::NodeCreated {
            node: NewNode {
                id: format!("1.{seq}"),
                node_type: "claim".to_string(),
                statement: "step".to_string(),
                inference_rule: "assumption".to_string(),
                dependencies: vec![],
                validation_deps: vec![],
            },
        },
    }
}

fn bench_append(c: &mut Criterion) {
    c.bench_function("ledger_append_sequential", |b| {
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let ledger = Ledger::open(dir.path(), &Config::default());
                for i in 1..=100 {
                    black_box(ledger.append(node_created(i)).unwrap());
                }
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_fold(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open(dir.path(), &Config::default());
    ledger
        .append(Envelope {
            timestamp: prooftree_core::ids::now_utc(),
            seq: 0,
            payload: EventPayload::NodeCreated {
                node: NewNode {
                    id: "1".to_string(),
                    node_type: "claim".to_string(),
                    statement: "root".to_string(),
                    inference_rule: "assumption".to_string(),
                    dependencies: vec![],
                    validation_deps: vec![],
                },
            },
        })
        .unwrap();
    for i in 1..=500 {
        ledger.append(node_created(i)).unwrap();
    }
    let events = ledger.read_all().unwrap();

    c.bench_function("state_fold_500_events", |b| {
        b.iter(|| black_box(State::fold(black_box(&events)).unwrap()));
    });
}

criterion_group!(benches, bench_append, bench_fold);
criterion_main!(benches);
