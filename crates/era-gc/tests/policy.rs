//! Scheduling policies and heap-level invariants.

use std::cell::Cell;
use std::time::Duration;

use era_gc::test_util::generation_counts;
use era_gc::{
    collect, collect_full, new_managed, set_policy, stats, CountPolicy, Handle, ManualPolicy,
    TimePolicy,
};

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(Cell::get)
}

struct Counted;

impl Drop for Counted {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

struct Node {
    next: Handle<Node>,
}

#[test]
fn count_policy_triggers_young_collections() {
    set_policy(Box::new(CountPolicy {
        young_trigger: 10,
        full_trigger: usize::MAX,
    }));
    let before = stats().young_collections;
    for _ in 0..30 {
        drop(new_managed(Counted));
    }
    assert!(stats().young_collections > before);
    assert!(drops() > 0);
}

#[test]
fn count_policy_escalates_to_full() {
    set_policy(Box::new(CountPolicy {
        young_trigger: 5,
        full_trigger: 3,
    }));
    let mut kept = Vec::new();
    for _ in 0..60 {
        kept.push(new_managed(Counted));
    }
    // Enough survivors promoted for the old generation to cross the
    // threshold after some young collection.
    assert!(stats().full_collections > 0);
    assert_eq!(drops(), 0);
    drop(kept);
    collect_full();
    collect_full();
    assert_eq!(drops(), 60);
}

#[test]
fn time_policy_triggers_under_pressure() {
    let mut policy = TimePolicy::new(Duration::ZERO);
    policy.min_allocs = 8;
    set_policy(Box::new(policy));
    let before = stats().young_collections;
    for _ in 0..40 {
        drop(new_managed(Counted));
    }
    assert!(stats().young_collections > before);
}

#[test]
fn live_set_stabilizes_across_collections() {
    set_policy(Box::new(ManualPolicy));
    let roots: Vec<_> = (0..20).map(|_| new_managed(Node { next: Handle::null() })).collect();
    for i in 0..19 {
        roots[i].next.set(&roots[i + 1]);
    }
    drop(new_managed(Counted));

    collect();
    let after_first = generation_counts();
    collect();
    let after_second = generation_counts();
    // No reachable object may be reclaimed by the second cycle.
    assert_eq!(
        after_first.0 + after_first.1,
        after_second.0 + after_second.1
    );
    assert_eq!(drops(), 1);
    for root in &roots {
        assert!(root.get().is_some());
    }
}

#[test]
fn unreachable_graph_is_fully_reclaimed_within_two_collections() {
    set_policy(Box::new(ManualPolicy));
    let roots: Vec<_> = (0..10).map(|_| new_managed(Node { next: Handle::null() })).collect();
    for i in 0..9 {
        roots[i].next.set(&roots[i + 1]);
    }
    // Close a ring so reclamation must go through cycle collection.
    roots[9].next.set(&roots[0]);
    drop(roots);

    collect_full();
    collect_full();
    assert_eq!(generation_counts(), (0, 0));
}

#[test]
fn manual_policy_never_collects_on_its_own() {
    set_policy(Box::new(ManualPolicy));
    let before = stats().young_collections;
    for _ in 0..2000 {
        drop(new_managed(0_u8));
    }
    assert_eq!(stats().young_collections, before);
    collect();
    assert!(stats().young_collections > before);
}

#[test]
fn dump_stats_reports_consistent_numbers() {
    set_policy(Box::new(ManualPolicy));
    let _a = new_managed(1_u32);
    let _b = new_managed(2_u32);
    collect();
    let s = stats();
    assert_eq!(s.young_objects + s.old_objects, 2);
    assert_eq!(s.live_objects, 2);
    era_gc::dump_stats();
}
