//! Graph churn under automatic triggering.

use std::cell::Cell;

use era_gc::test_util::generation_counts;
use era_gc::{collect_full, new_managed, set_policy, CountPolicy, Handle};

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(Cell::get)
}

struct Node {
    id: u32,
    next: Handle<Node>,
    other: Handle<Node>,
}

impl Node {
    fn new(id: u32) -> Self {
        Self {
            id,
            next: Handle::null(),
            other: Handle::null(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

// Deterministic xorshift; no external randomness in tests.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

#[test]
fn graph_churn_reclaims_everything_in_the_end() {
    set_policy(Box::new(CountPolicy {
        young_trigger: 64,
        full_trigger: 256,
    }));

    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    let mut pool: Vec<Handle<Node>> = Vec::new();
    let mut allocated: u32 = 0;

    for round in 0..2000_u32 {
        match rng.next() % 5 {
            // Allocate a fresh node.
            0 | 1 => {
                pool.push(new_managed(Node::new(allocated)));
                allocated += 1;
            }
            // Rewire two survivors.
            2 if pool.len() >= 2 => {
                let a = (rng.next() as usize) % pool.len();
                let b = (rng.next() as usize) % pool.len();
                pool[a].next.set(&pool[b]);
            }
            3 if pool.len() >= 2 => {
                let a = (rng.next() as usize) % pool.len();
                let b = (rng.next() as usize) % pool.len();
                pool[a].other.set(&pool[b]);
            }
            // Drop a root; the node may stay reachable through links.
            _ if !pool.is_empty() => {
                let at = (rng.next() as usize) % pool.len();
                pool.swap_remove(at);
            }
            _ => {
                pool.push(new_managed(Node::new(allocated)));
                allocated += 1;
            }
        }
        if round % 512 == 0 {
            // Reachable nodes must stay readable whatever the generation.
            for handle in &pool {
                assert!(handle.get().is_some());
            }
        }
    }

    let survivors = pool.len();
    assert!(allocated as usize >= survivors);

    // Sever every link, then drop the roots: the whole graph must go.
    for handle in &pool {
        handle.next.clear();
        handle.other.clear();
    }
    pool.clear();
    collect_full();
    collect_full();
    assert_eq!(generation_counts(), (0, 0));
    assert_eq!(drops(), allocated as usize);

    // And the collector remains usable afterwards.
    let fresh = new_managed(Node::new(u32::MAX));
    assert_eq!(fresh.get().unwrap().id, u32::MAX);
}
