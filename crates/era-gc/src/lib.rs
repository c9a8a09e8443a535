//! A tiny generational mark-and-sweep garbage collector.
//!
//! `era-gc` provides [`Handle<T>`], a smart pointer into a traced heap. The
//! collector discovers the handle fields embedded in your types at their
//! first construction — no derive macro, no manual trace implementation —
//! and reclaims everything unreachable from root handles, cycles included.
//!
//! # Quick start
//!
//! ```ignore
//! use era_gc::{collect, new_managed, Handle};
//!
//! struct Node {
//!     value: i32,
//!     next: Handle<Node>,
//! }
//!
//! let a = new_managed(Node { value: 1, next: Handle::null() });
//! let b = new_managed(Node { value: 2, next: Handle::null() });
//!
//! // Build a cycle; it is still collectable.
//! a.next.set(&b);
//! b.next.set(&a);
//!
//! drop(a);
//! drop(b);
//! era_gc::collect_full(); // both nodes are reclaimed
//! ```
//!
//! # Generations
//!
//! Allocations start in the young generation and are promoted after
//! surviving a configurable number of young collections. Assignments into
//! promoted objects are tracked through a remembered set, so frequent young
//! collections stay proportional to the young heap. [`collect`] runs a
//! young collection (escalating per policy); [`collect_full`] always sweeps
//! both generations. Policies are pluggable via [`set_policy`].
//!
//! # Handle discipline
//!
//! Discovery happens by scanning the first-constructed value of each type,
//! which imposes two rules:
//!
//! - Handle fields must be present from the first instance on: use
//!   [`Handle::null`] for "nothing yet", not `Option<Handle<T>>`.
//! - Handles the collector cannot see — stored behind raw pointers, in
//!   unmanaged heap blocks, or inside containers allocated without their
//!   adapter ([`new_managed_vec`] and friends) — are not traced; cycles
//!   routed through them leak.
//! - A handle created already pointing at an object (a factory return, a
//!   clone, [`handle_from_raw`]) roots that object for the handle's whole
//!   lifetime, even after the handle is moved into a managed payload.
//!   Build links you want the collector to break — cyclic ones above all —
//!   by calling [`Handle::set`] on null-born fields.
//!
//! # Thread model
//!
//! Strictly single-threaded: every collector structure is thread-local and
//! `Handle<T>` is `!Send + !Sync`. Each thread has its own independent
//! heap, torn down (with all surviving objects) when the thread exits.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
mod enumerate;
mod gc;
mod header;
mod list;
mod metrics;
mod policy;
mod ptr;
mod registry;
mod trace_log;

pub use adapters::{
    new_managed_btree_map, new_managed_deque, new_managed_flat_vec, new_managed_map,
    new_managed_vec, FlatVec, HandleBTreeMap, HandleDeque, HandleFlatVec, HandleMap, HandleVec,
    ManagedElements,
};
pub use enumerate::{HandleContainer, RawHandle};
pub use gc::{
    collect, collect_full, new_managed, new_managed_array, new_managed_container,
    new_managed_cyclic, set_allocator, set_policy, set_scan_age_to_promote, AllocFn, DeallocFn,
};
pub use metrics::{dump_stats, last_gc_metrics, stats, CollectionType, GcMetrics, GcStats};
pub use policy::{CollectInfo, CountPolicy, GcPolicy, ManualPolicy, TimePolicy};
pub use ptr::{force_destroy, handle_from_raw, Handle};
pub use registry::ensure_registered;

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util {
    //! Introspection hooks for integration tests.

    use crate::registry::TypeDesc;

    /// The frozen embedded-handle offsets of `T`, if discovery has run.
    pub fn registered_offsets<T: 'static>() -> Option<Vec<u32>> {
        TypeDesc::of::<T>().offsets.get().map(|o| o.to_vec())
    }

    /// (young, old) object counts.
    pub fn generation_counts() -> (usize, usize) {
        crate::gc::with_gc(crate::gc::Collector::generation_counts)
    }

    /// Number of entries in the root set.
    pub fn root_set_len() -> usize {
        crate::gc::with_gc(crate::gc::Collector::root_set_len)
    }
}
