//! Early destruction semantics.

use std::cell::Cell;

use era_gc::test_util::generation_counts;
use era_gc::{collect, force_destroy, new_managed, set_policy, Handle, ManualPolicy};

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(Cell::get)
}

struct Counted(u32);

impl Drop for Counted {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

#[test]
fn destructor_runs_immediately_memory_follows_later() {
    set_policy(Box::new(ManualPolicy));
    let a = new_managed(Counted(1));
    force_destroy(&a);
    assert_eq!(drops(), 1);
    assert!(a.is_null());
    // The raw memory is reclaimed by the next sweep.
    assert_eq!(generation_counts(), (1, 0));
    collect();
    assert_eq!(generation_counts(), (0, 0));
    assert_eq!(drops(), 1);
}

#[test]
fn force_destroy_is_idempotent() {
    let a = new_managed(Counted(2));
    let b = a.clone();
    force_destroy(&a);
    force_destroy(&b);
    assert_eq!(drops(), 1);
}

#[test]
fn aliases_observe_a_destroyed_target() {
    set_policy(Box::new(ManualPolicy));
    let a = new_managed(Counted(3));
    let alias = a.clone();
    force_destroy(&a);
    assert_eq!(drops(), 1);
    assert!(alias.get().is_none());
    assert!(alias.is_null());

    // The alias still targets the destroyed header, so its memory is kept
    // as a tombstone until the alias lets go.
    collect();
    assert_eq!(generation_counts(), (1, 0));
    alias.clear();
    collect();
    assert_eq!(generation_counts(), (0, 0));
}

#[test]
#[should_panic(expected = "null or destroyed")]
fn deref_after_force_destroy_panics() {
    let a = new_managed(Counted(4));
    let alias = a.clone();
    force_destroy(&a);
    let _ = alias.0;
}

#[test]
fn destroyed_object_drops_its_embedded_handles() {
    struct Owner {
        child: Handle<Counted>,
    }

    set_policy(Box::new(ManualPolicy));
    let child = new_managed(Counted(5));
    let owner = new_managed(Owner {
        child: child.clone(),
    });
    drop(child);
    collect();
    assert_eq!(drops(), 0);

    force_destroy(&owner);
    // Owner's destructor dropped its embedded handle; the child is now
    // unreachable.
    collect();
    assert_eq!(drops(), 1);
}
