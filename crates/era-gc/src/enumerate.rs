//! Embedded-handle enumeration.
//!
//! The collector walks the handles inside one allocation through a single
//! uniform shape: a type-erased function that visits each embedded handle
//! once. Fixed-layout types use the frozen offset table; container types
//! install a custom walker over their current storage. Internal iteration
//! keeps the traversal allocation-free.

use std::ptr::NonNull;

use crate::header::ObjHeader;
use crate::ptr::{Handle, HandleSlot};
use crate::registry::TypeDesc;

/// Type-erased view of one embedded handle: the stable slot the handle
/// value points at.
#[derive(Clone, Copy)]
pub struct RawHandle(pub(crate) NonNull<HandleSlot>);

impl RawHandle {
    /// The erased view of a typed handle.
    #[must_use]
    pub fn of<T: 'static>(handle: &Handle<T>) -> Self {
        Self(handle.slot())
    }

    pub(crate) fn slot(&self) -> &HandleSlot {
        // SAFETY: a RawHandle is only constructed from a live handle, and
        // the arena keeps slot memory alive for the collector's lifetime.
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn target(&self) -> Option<NonNull<ObjHeader>> {
        NonNull::new(self.slot().target.get())
    }
}

/// Walks every embedded handle in a payload of `len` elements.
pub(crate) type EnumerateFn =
    fn(payload: *const u8, len: usize, desc: &TypeDesc, visit: &mut dyn FnMut(RawHandle));

/// Default enumeration for fixed-layout types: the offset-table walk.
///
/// Every candidate word is re-validated against the slot arena before it is
/// yielded, so a stale offset (or a padding byte-pattern recorded by the
/// first-construction scan) results in a skipped visit, never a wild
/// dereference.
pub(crate) fn enumerate_by_offsets(
    payload: *const u8,
    len: usize,
    desc: &TypeDesc,
    visit: &mut dyn FnMut(RawHandle),
) {
    let Some(offsets) = desc.offsets.get() else {
        return;
    };
    for i in 0..len {
        // SAFETY: the collector only enumerates payloads of `len` live
        // elements; offsets are < elem_size.
        let base = unsafe { payload.add(i * desc.elem_size) };
        for &off in offsets.iter() {
            // SAFETY: off + word size <= elem_size per the freeze scan.
            let word = unsafe { base.add(off as usize).cast::<usize>().read() };
            if let Some(slot) = crate::ptr::live_slot_at(word) {
                visit(RawHandle(slot));
            }
        }
    }
}

/// A container whose embedded handles cannot sit at fixed offsets.
///
/// Implementations must yield every handle currently live inside the
/// container, once each, and must tolerate their storage relocating between
/// collections (ownership is re-discovered every cycle).
///
/// # Safety
///
/// Missing a live handle lets the collector reclaim its target while the
/// container still points at it. An implementation must visit **all**
/// handles reachable from the container's current state, and must not
/// allocate managed objects or create, clone or drop handles during the
/// walk — the collector may be mid-collection.
pub unsafe trait HandleContainer: 'static {
    /// Visit each embedded handle once.
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle));
}
