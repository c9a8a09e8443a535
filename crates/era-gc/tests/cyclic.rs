//! Self-references taken inside initializers via `handle_from_raw`.

use std::cell::Cell;

use era_gc::{collect, handle_from_raw, new_managed, new_managed_cyclic, Handle};

thread_local! {
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

fn drops() -> usize {
    DROPS.with(Cell::get)
}

struct SelfRef {
    me: Handle<SelfRef>,
    tag: u32,
}

impl Drop for SelfRef {
    fn drop(&mut self) {
        DROPS.with(|d| d.set(d.get() + 1));
    }
}

#[test]
fn self_handle_points_back_at_the_object() {
    let a = new_managed_cyclic(|this| SelfRef {
        // SAFETY: `this` is the payload under construction.
        me: unsafe { handle_from_raw(this) },
        tag: 42,
    });
    assert!(Handle::ptr_eq(&a, &a.me));
    assert_eq!(a.me.get().unwrap().tag, 42);
}

#[test]
fn self_handle_pins_until_nulled() {
    let a = new_managed_cyclic(|this| SelfRef {
        // SAFETY: `this` is the payload under construction.
        me: unsafe { handle_from_raw(this) },
        tag: 1,
    });
    drop(a);
    collect();
    // The constructor-taken self-reference still roots the object.
    assert_eq!(drops(), 0);

    // A second object whose self-reference is nulled before the external
    // root goes away is reclaimed normally, exactly once.
    let b = new_managed_cyclic(|this| SelfRef {
        // SAFETY: as above.
        me: unsafe { handle_from_raw(this) },
        tag: 2,
    });
    b.me.clear();
    drop(b);
    collect();
    assert_eq!(drops(), 1);
}

#[test]
fn initializer_may_allocate() {
    struct Outer {
        me: Handle<Outer>,
        inner: Handle<u32>,
    }

    let o = new_managed_cyclic(|this| Outer {
        // SAFETY: `this` is the payload under construction.
        me: unsafe { handle_from_raw(this) },
        inner: new_managed(11_u32),
    });
    assert!(Handle::ptr_eq(&o, &o.me));
    assert_eq!(*o.inner, 11);
    collect();
    assert_eq!(*o.inner, 11);
}

#[test]
fn from_raw_rejects_unmanaged_memory() {
    // A zeroed buffer guarantees the would-be header bytes fail the magic
    // check deterministically.
    let buf = [0_u64; 32];
    let p = unsafe { buf.as_ptr().add(16) };
    let h = unsafe { handle_from_raw(p) };
    assert!(h.is_null());
}

#[test]
fn from_raw_null_is_null() {
    let h = unsafe { handle_from_raw(std::ptr::null::<u64>()) };
    assert!(h.is_null());
}
