//! Allocation and collection throughput.

use criterion::{criterion_group, criterion_main, Criterion};
use era_gc::{collect, collect_full, new_managed, Handle};
use std::hint::black_box;

struct Node {
    value: i64,
    next: Handle<Node>,
}

fn bench_alloc_drop_collect(c: &mut Criterion) {
    c.bench_function("alloc_1000_drop_collect", |b| {
        b.iter(|| {
            let nodes: Vec<_> = (0..1000)
                .map(|value| {
                    new_managed(Node {
                        value,
                        next: Handle::null(),
                    })
                })
                .collect();
            black_box(&nodes);
            drop(nodes);
            collect();
        });
    });
}

fn bench_collect_live_chain(c: &mut Criterion) {
    let nodes: Vec<_> = (0..10_000)
        .map(|value| {
            new_managed(Node {
                value,
                next: Handle::null(),
            })
        })
        .collect();
    for window in nodes.windows(2) {
        window[0].next.set(&window[1]);
    }
    c.bench_function("young_collect_10k_live", |b| {
        b.iter(|| {
            collect();
            black_box(nodes[0].value);
        });
    });
    drop(nodes);
    collect_full();
}

fn bench_full_collect_mixed(c: &mut Criterion) {
    c.bench_function("full_collect_mixed_graph", |b| {
        b.iter(|| {
            let keep: Vec<_> = (0..100)
                .map(|value| {
                    new_managed(Node {
                        value,
                        next: Handle::null(),
                    })
                })
                .collect();
            for i in 0..99 {
                keep[i].next.set(&keep[i + 1]);
            }
            // A garbage ring alongside the live chain.
            let a = new_managed(Node {
                value: -1,
                next: Handle::null(),
            });
            let b2 = new_managed(Node {
                value: -2,
                next: Handle::null(),
            });
            a.next.set(&b2);
            b2.next.set(&a);
            drop(a);
            drop(b2);
            collect_full();
            black_box(&keep);
        });
    });
}

criterion_group!(
    benches,
    bench_alloc_drop_collect,
    bench_collect_live_chain,
    bench_full_collect_mixed
);
criterion_main!(benches);
