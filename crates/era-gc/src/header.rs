//! Per-allocation object headers.
//!
//! One [`ObjHeader`] precedes every managed payload. The header records the
//! type descriptor, the element count, the mark color and the generation
//! bookkeeping; the payload starts at `header + TypeDesc::payload_offset`.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::list::ListLink;
use crate::registry::TypeDesc;

/// Sentinel byte checked when a raw payload pointer is adopted.
pub(crate) const HEADER_MAGIC: u8 = 0xDD;

/// Mark color. White allocations are candidate garbage; Black allocations
/// were reached in the current cycle. Between collections every resting
/// header is White.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Color {
    White,
    Black,
}

/// Metadata preceding every managed allocation.
#[repr(C)]
pub(crate) struct ObjHeader {
    /// Owning type descriptor. Immutable after allocation.
    pub(crate) desc: &'static TypeDesc,
    /// Element count at allocation time. Immutable; used to recover the
    /// allocation layout even after the payload has been destroyed.
    pub(crate) alloc_len: usize,
    /// Live element count. Reset to 0 once destructors have run; a zero
    /// length marks the slot as destroyed and pending deallocation.
    pub(crate) length: Cell<usize>,
    /// Mark color for the current cycle.
    pub(crate) color: Cell<Color>,
    /// Young-generation survival counter; drives promotion.
    pub(crate) scan_age: Cell<u8>,
    /// Cached hint: false once an enumeration of a fixed-layout payload
    /// produced no embedded handles.
    pub(crate) has_sub_handles: Cell<bool>,
    /// Validity sentinel for `handle_from_raw`.
    pub(crate) magic: u8,
    /// Number of live handles currently targeting this allocation. A
    /// destroyed header is deallocated only once this reaches zero, so a
    /// surviving handle observes a destroyed target (`get` returns `None`)
    /// instead of freed memory.
    pub(crate) handle_refs: Cell<usize>,
    /// Intrusive generation-list links.
    pub(crate) link: ListLink,
}

impl ObjHeader {
    pub(crate) fn new(desc: &'static TypeDesc, len: usize, color: Color) -> Self {
        Self {
            desc,
            alloc_len: len,
            length: Cell::new(len),
            color: Cell::new(color),
            scan_age: Cell::new(0),
            // A frozen-empty offset table can never yield handles; anything
            // else starts optimistic and is refined by the pre-mark pass.
            has_sub_handles: Cell::new(!desc.known_handle_free()),
            magic: HEADER_MAGIC,
            handle_refs: Cell::new(0),
            link: ListLink::new(),
        }
    }

    pub(crate) fn retain(&self) {
        self.handle_refs.set(self.handle_refs.get() + 1);
    }

    pub(crate) fn release(&self) {
        let refs = self.handle_refs.get();
        debug_assert!(refs > 0, "handle ref underflow");
        self.handle_refs.set(refs.saturating_sub(1));
    }

    pub(crate) fn is_unreferenced(&self) -> bool {
        self.handle_refs.get() == 0
    }

    /// First payload byte.
    pub(crate) fn payload(&self) -> *mut u8 {
        let base = std::ptr::from_ref(self) as *mut u8;
        // SAFETY: the allocation extends payload_offset + alloc_len elements
        // past the header; see Collector::allocate.
        unsafe { base.add(self.desc.payload_offset) }
    }

    /// Payload bytes covered by this allocation.
    pub(crate) fn size_in_bytes(&self) -> usize {
        self.alloc_len * self.desc.elem_size
    }

    /// Whether destructors have already run.
    pub(crate) fn is_destroyed(&self) -> bool {
        self.length.get() == 0
    }

    /// Run the payload destructors now. Idempotent; the raw memory is left
    /// for the next sweep.
    pub(crate) fn destroy(&self) {
        let len = self.length.get();
        if len == 0 {
            return;
        }
        self.length.set(0);
        // SAFETY: the payload held `len` live elements of the described type
        // until this point, and length is zeroed first so reentrant destroy
        // calls (e.g. from a destructor) are no-ops.
        unsafe { (self.desc.drop_fn)(self.payload(), len) };
    }

    /// Recover a header from a raw payload pointer, validating the magic
    /// sentinel.
    ///
    /// # Safety
    ///
    /// `payload` must either be a pointer previously returned for a managed
    /// allocation of a type with this descriptor, or at least point far
    /// enough into readable memory that the preceding header bytes can be
    /// inspected.
    pub(crate) unsafe fn from_payload(
        desc: &'static TypeDesc,
        payload: *const u8,
    ) -> Option<NonNull<ObjHeader>> {
        if payload.is_null() {
            return None;
        }
        // SAFETY: caller guarantees the bytes before payload are readable.
        let header = unsafe { payload.sub(desc.payload_offset) };
        // Byte read: an arbitrary caller pointer carries no alignment
        // guarantee for the would-be header.
        // SAFETY: as above.
        let magic = unsafe { header.add(std::mem::offset_of!(ObjHeader, magic)).read() };
        if magic != HEADER_MAGIC {
            return None;
        }
        NonNull::new(header as *mut ObjHeader)
    }
}
