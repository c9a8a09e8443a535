//! Per-type descriptors and the embedded-handle offset registry.
//!
//! One [`TypeDesc`] exists per concrete element type, created lazily on
//! first use and leaked for the rest of the thread's lifetime. A descriptor
//! dispatches exactly two type-erased behaviors: destruction of a payload
//! range and enumeration of the embedded handles inside it.
//!
//! For fixed-layout types the enumeration walks a table of byte offsets.
//! The table is discovered once, on the first successful construction:
//! after the first value of `T` has been moved into its payload, the
//! factory scans the payload for words addressing live handle slots and
//! freezes the result. Rust constructs values on the stack and moves them
//! bitwise, so a handle field's constructor never runs at the field's final
//! address; scanning the settled payload is what makes first-construction
//! discovery possible without user enumeration.

use std::any::TypeId;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::mem;

use crate::enumerate::{enumerate_by_offsets, EnumerateFn, HandleContainer, RawHandle};

/// Type-erased destructor over a contiguous payload range.
pub(crate) type DropFn = unsafe fn(*mut u8, usize);

/// Descriptor for one concrete element type.
pub struct TypeDesc {
    /// `size_of::<T>()`.
    pub(crate) elem_size: usize,
    /// `align_of::<T>()`.
    pub(crate) elem_align: usize,
    /// Byte offset from the header to the first payload byte.
    pub(crate) payload_offset: usize,
    /// True when embedded handles sit at fixed offsets (plain structs);
    /// false for containers with a custom enumerator.
    pub(crate) fixed_layout: bool,
    pub(crate) drop_fn: DropFn,
    pub(crate) enumerate_fn: EnumerateFn,
    /// Byte offsets of embedded handles within one element, strictly
    /// ascending. Unset until the first successful construction freezes it;
    /// read-only afterwards.
    pub(crate) offsets: OnceCell<Box<[u32]>>,
}

impl TypeDesc {
    /// Whether offset discovery has completed for this type.
    pub(crate) fn registered(&self) -> bool {
        !self.fixed_layout || self.offsets.get().is_some()
    }

    /// True when this type can never contain embedded handles: its offset
    /// table is frozen and empty.
    pub(crate) fn known_handle_free(&self) -> bool {
        self.fixed_layout && self.offsets.get().is_some_and(|o| o.is_empty())
    }

    fn new<T: 'static>(fixed_layout: bool, enumerate_fn: EnumerateFn) -> Self {
        let align = mem::align_of::<T>().max(1);
        Self {
            elem_size: mem::size_of::<T>(),
            elem_align: align,
            payload_offset: mem::size_of::<crate::header::ObjHeader>().next_multiple_of(align),
            fixed_layout,
            drop_fn: drop_range::<T>,
            enumerate_fn,
            offsets: OnceCell::new(),
        }
    }

    /// Descriptor for a fixed-layout type, created on first use.
    pub(crate) fn of<T: 'static>() -> &'static TypeDesc {
        lookup(TypeId::of::<T>(), || Self::new::<T>(true, enumerate_by_offsets))
    }

    /// Descriptor for a container type with a custom enumerator.
    ///
    /// Panics if `C` was previously allocated through the plain factory:
    /// a fixed-layout descriptor cannot trace a container's heap storage.
    pub(crate) fn of_container<C: HandleContainer>() -> &'static TypeDesc {
        let desc = lookup(TypeId::of::<C>(), || {
            Self::new::<C>(false, container_enumerate::<C>)
        });
        assert!(
            !desc.fixed_layout,
            "container type was first allocated through new_managed; \
             allocate it through its container factory instead"
        );
        desc
    }

    /// Scan the first-constructed element for embedded handles and freeze
    /// the offset table. No-op once registered or for custom-enumerator
    /// types.
    ///
    /// # Safety
    ///
    /// `elem` must point at a fully initialized element of the described
    /// type.
    pub(crate) unsafe fn freeze_offsets(&self, elem: *const u8) {
        if !self.fixed_layout || self.offsets.get().is_some() {
            return;
        }
        let word = mem::size_of::<usize>();
        let mut found = Vec::new();
        // A type whose alignment cannot host a pointer cannot embed one.
        if self.elem_align >= mem::align_of::<usize>() && self.elem_size >= word {
            let mut off = 0;
            while off + word <= self.elem_size {
                // SAFETY: elem..elem+elem_size is initialized (padding bytes
                // may hold arbitrary values; a stray pattern is filtered by
                // the slot-arena membership test, and enumeration
                // re-validates every word it reads).
                let candidate = unsafe { elem.add(off).cast::<usize>().read() };
                if crate::ptr::is_live_slot_addr(candidate) {
                    found.push(off as u32);
                }
                off += mem::align_of::<usize>();
            }
        }
        let _ = self.offsets.set(found.into_boxed_slice());
    }
}

fn drop_range<T>(payload: *mut u8, len: usize) {
    let ptr = payload.cast::<T>();
    // SAFETY: the collector only invokes drop_fn over a payload holding
    // exactly `len` live elements of T.
    unsafe { std::ptr::drop_in_place(std::ptr::slice_from_raw_parts_mut(ptr, len)) };
}

fn container_enumerate<C: HandleContainer>(
    payload: *const u8,
    len: usize,
    _desc: &TypeDesc,
    visit: &mut dyn FnMut(RawHandle),
) {
    let mut elem = payload.cast::<C>();
    for _ in 0..len {
        // SAFETY: the collector only enumerates payloads holding `len` live
        // elements of the described type.
        unsafe { (*elem).for_each_handle(visit) };
        // SAFETY: stays within the payload range.
        elem = unsafe { elem.add(1) };
    }
}

thread_local! {
    static REGISTRY: RefCell<HashMap<TypeId, &'static TypeDesc>> =
        RefCell::new(HashMap::new());
}

fn lookup(id: TypeId, make: impl FnOnce() -> TypeDesc) -> &'static TypeDesc {
    REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        *reg.entry(id).or_insert_with(|| Box::leak(Box::new(make())))
    })
}

/// Eagerly register `T`'s offset table by constructing and immediately
/// destroying a probe instance. Container adapters use this before
/// enumerating elements that are themselves compound.
pub fn ensure_registered<T: Default + 'static>() {
    if !TypeDesc::of::<T>().registered() {
        let probe = crate::gc::new_managed(T::default());
        crate::ptr::force_destroy(&probe);
    }
}
