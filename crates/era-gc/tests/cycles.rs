//! Cycle reclamation through null-born, later-assigned links.

use std::cell::Cell;

use era_gc::{collect, collect_full, new_managed, Handle};

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(Cell::get)
}

struct Node {
    value: i32,
    next: Handle<Node>,
}

impl Node {
    fn new(value: i32) -> Self {
        Self {
            value,
            next: Handle::null(),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

#[test]
fn two_node_cycle_is_reclaimed() {
    let a = new_managed(Node::new(1));
    let b = new_managed(Node::new(2));
    a.next.set(&b);
    b.next.set(&a);
    assert_eq!(a.next.get().unwrap().value, 2);
    assert_eq!(b.next.get().unwrap().value, 1);

    drop(a);
    drop(b);
    collect_full();
    collect_full();
    assert_eq!(drops(), 2);
}

#[test]
fn cycle_stays_alive_while_one_root_remains() {
    let a = new_managed(Node::new(1));
    let b = new_managed(Node::new(2));
    a.next.set(&b);
    b.next.set(&a);
    drop(b);
    collect_full();
    assert_eq!(drops(), 0);
    assert_eq!(a.next.get().unwrap().value, 2);
    drop(a);
    collect_full();
    collect_full();
    assert_eq!(drops(), 2);
}

#[test]
fn self_cycle_is_reclaimed_by_young_collection() {
    let a = new_managed(Node::new(9));
    a.next.set(&a);
    drop(a);
    collect();
    assert_eq!(drops(), 1);
}

#[test]
fn three_node_ring_is_reclaimed() {
    let nodes: Vec<_> = (0..3).map(|i| new_managed(Node::new(i))).collect();
    for i in 0..3 {
        nodes[i].next.set(&nodes[(i + 1) % 3]);
    }
    drop(nodes);
    collect_full();
    collect_full();
    assert_eq!(drops(), 3);
}

#[test]
fn relinked_chain_is_reclaimed() {
    // Links are rewired after construction; the final shape is a -> b -> c
    // -> tail with no root into it.
    let a = new_managed(Node::new(1));
    let b = new_managed(Node::new(2));
    let tail = new_managed(Node::new(3));
    a.next.set(&b);
    b.next.set(&a);
    let c = new_managed(Node::new(4));
    c.next.set(&tail);
    b.next.set(&c);
    drop(tail);
    drop(c);
    drop(a);
    drop(b);
    collect_full();
    collect_full();
    assert_eq!(drops(), 4);
}
