//! The `Handle<T>` managed pointer and its backing slot arena.
//!
//! A handle behaves like an owning pointer to a managed allocation but
//! participates in tracing. Its collector-visible state (target, root/old
//! classification, owning allocation) must keep a stable address while the
//! handle value itself is moved around by Rust, so it lives in a
//! [`HandleSlot`] allocated from a collector-owned arena; the handle is a
//! single pointer to its slot.
//!
//! Lifecycle: a slot is claimed at handle construction, queued on the
//! deferred-unref list when the handle drops, and returned to the arena at
//! the next collection's reconciliation step. Assignments go through the
//! deferred write barrier ([`Handle::set`]/[`Handle::clear`]).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::header::ObjHeader;
use crate::registry::TypeDesc;

// ============================================================================
// Handle slots
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// On the arena free list.
    Free,
    /// Claimed by a live handle.
    Live,
    /// Handle dropped; removal from the collector's sets is deferred to the
    /// next reconciliation.
    Dead,
}

/// Stable collector-visible state of one handle.
pub(crate) struct HandleSlot {
    /// Header the handle currently points at (nullable).
    pub(crate) target: Cell<*mut ObjHeader>,
    /// Owning allocation when embedded; null while the handle is a root.
    pub(crate) owner: Cell<*mut ObjHeader>,
    /// True iff the handle is not embedded in any managed allocation.
    pub(crate) is_root: Cell<bool>,
    /// True iff the handle is embedded in a promoted allocation.
    pub(crate) is_old: Cell<bool>,
    pub(crate) state: Cell<SlotState>,
}

impl HandleSlot {
    const fn vacant() -> Self {
        Self {
            target: Cell::new(std::ptr::null_mut()),
            owner: Cell::new(std::ptr::null_mut()),
            is_root: Cell::new(true),
            is_old: Cell::new(false),
            state: Cell::new(SlotState::Free),
        }
    }
}

const SLOTS_PER_CHUNK: usize = 128;

/// Chunked arena of handle slots.
///
/// Chunks are never freed before the collector itself, so a slot address is
/// stable for the lifetime of its handle and the chunk ranges support the
/// membership test behind offset discovery and enumeration validation.
pub(crate) struct SlotArena {
    chunks: RefCell<Vec<Box<[HandleSlot; SLOTS_PER_CHUNK]>>>,
    /// Sorted (base, end) address ranges of the chunks.
    ranges: RefCell<Vec<(usize, usize)>>,
    free: RefCell<Vec<NonNull<HandleSlot>>>,
}

impl SlotArena {
    pub(crate) fn new() -> Self {
        Self {
            chunks: RefCell::new(Vec::new()),
            ranges: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
        }
    }

    /// Claim a slot for a newborn handle, retaining the target.
    pub(crate) fn claim(&self, target: *mut ObjHeader) -> NonNull<HandleSlot> {
        if let Some(header) = NonNull::new(target) {
            // SAFETY: callers only pass live headers.
            unsafe { header.as_ref() }.retain();
        }
        let slot = self.free.borrow_mut().pop().unwrap_or_else(|| self.grow());
        // SAFETY: slots handed out by grow/free-list are valid arena cells.
        let cell = unsafe { slot.as_ref() };
        cell.target.set(target);
        cell.owner.set(std::ptr::null_mut());
        cell.is_root.set(true);
        cell.is_old.set(false);
        cell.state.set(SlotState::Live);
        slot
    }

    fn grow(&self) -> NonNull<HandleSlot> {
        let mut chunks = self.chunks.borrow_mut();
        chunks.push(Box::new(std::array::from_fn(|_| HandleSlot::vacant())));
        // Derive every pointer only after the box has reached its final
        // place; the slots themselves never move again.
        let chunk: &[HandleSlot; SLOTS_PER_CHUNK] = chunks.last().expect("just pushed");
        let base = chunk.as_ptr() as usize;
        let end = base + SLOTS_PER_CHUNK * std::mem::size_of::<HandleSlot>();
        {
            let mut ranges = self.ranges.borrow_mut();
            let at = ranges.partition_point(|&(b, _)| b < base);
            ranges.insert(at, (base, end));
        }
        let mut free = self.free.borrow_mut();
        for slot in chunk.iter().skip(1) {
            free.push(NonNull::from(slot));
        }
        NonNull::from(&chunk[0])
    }

    /// Return a dead slot to the free list (reconciliation only).
    pub(crate) fn release(&self, slot: NonNull<HandleSlot>) {
        // SAFETY: slot is an arena cell; reconciliation owns it by now.
        let cell = unsafe { slot.as_ref() };
        debug_assert_eq!(cell.state.get(), SlotState::Dead);
        cell.state.set(SlotState::Free);
        cell.target.set(std::ptr::null_mut());
        cell.owner.set(std::ptr::null_mut());
        self.free.borrow_mut().push(slot);
    }

    /// If `addr` is the address of a live slot, return it.
    pub(crate) fn contains_live(&self, addr: usize) -> Option<NonNull<HandleSlot>> {
        let ranges = self.ranges.borrow();
        let idx = ranges.partition_point(|&(b, _)| b <= addr);
        let &(base, end) = ranges.get(idx.checked_sub(1)?)?;
        if addr >= end || (addr - base) % std::mem::size_of::<HandleSlot>() != 0 {
            return None;
        }
        // SAFETY: addr lies on a slot boundary inside a live chunk.
        let slot = unsafe { NonNull::new_unchecked(addr as *mut HandleSlot) };
        // SAFETY: as above.
        (unsafe { slot.as_ref() }.state.get() == SlotState::Live).then_some(slot)
    }
}

/// Arena membership test for a candidate word read out of a payload.
pub(crate) fn live_slot_at(addr: usize) -> Option<NonNull<HandleSlot>> {
    crate::gc::try_with_gc(|gc| gc.slots().contains_live(addr)).flatten()
}

/// Whether `addr` addresses a live handle slot.
pub(crate) fn is_live_slot_addr(addr: usize) -> bool {
    live_slot_at(addr).is_some()
}

// ============================================================================
// Handle
// ============================================================================

/// A managed pointer to a garbage-collected allocation.
///
/// Handles are nullable, cheap to clone (each clone claims its own slot and
/// keeps the target alive independently), and `!Send + !Sync` — the
/// collector is strictly single-threaded.
///
/// A handle embedded in a managed object is discovered through the owning
/// type's frozen offset table. Two rules make discovery reliable:
///
/// - A handle field must be *present* in the first-constructed instance of
///   its type: use [`Handle::null`] as the empty state, not
///   `Option<Handle<T>>` (a `None` is a null word the first-construction
///   scan cannot see).
/// - Handles stored behind raw pointers or inside unmanaged heap blocks are
///   invisible to tracing and will keep nothing alive past their own
///   lifetime; cycles routed through such storage leak.
pub struct Handle<T: 'static> {
    slot: NonNull<HandleSlot>,
    _not_send: PhantomData<*const T>,
}

impl<T: 'static> Handle<T> {
    /// A handle pointing at nothing.
    #[must_use]
    pub fn null() -> Self {
        let slot = crate::gc::with_gc(|gc| gc.slots().claim(std::ptr::null_mut()));
        Self {
            slot,
            _not_send: PhantomData,
        }
    }

    /// Handle for a freshly allocated or adopted header.
    ///
    /// A handle born with a target is rooted eagerly: it keeps its target
    /// alive from this moment until the handle itself dies (or the target
    /// is reassigned away while the handle is embedded). Deferring this to
    /// the barrier queue would let the pre-mark pass demote the handle
    /// before the queue is absorbed, silently unrooting a fresh object.
    pub(crate) fn from_header(header: NonNull<ObjHeader>) -> Self {
        let slot = crate::gc::with_gc(|gc| {
            let slot = gc.slots().claim(header.as_ptr());
            gc.root_insert(slot);
            slot
        });
        Self {
            slot,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn slot(&self) -> NonNull<HandleSlot> {
        self.slot
    }

    fn slot_ref(&self) -> &HandleSlot {
        // SAFETY: the slot stays claimed for this handle's whole lifetime.
        unsafe { self.slot.as_ref() }
    }

    pub(crate) fn header(&self) -> Option<NonNull<ObjHeader>> {
        NonNull::new(self.slot_ref().target.get())
    }

    /// Borrow the pointee, or `None` when the handle is null or the target
    /// has been destroyed early.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        let header = self.header()?;
        // SAFETY: target headers stay allocated while a live handle points
        // at them (a live handle is a root or is reachable from one).
        let header = unsafe { header.as_ref() };
        if header.is_destroyed() {
            return None;
        }
        // SAFETY: non-destroyed payloads hold live elements of T.
        Some(unsafe { &*header.payload().cast::<T>() })
    }

    /// Borrow all elements of a managed array (a single object is a
    /// one-element array).
    #[must_use]
    pub fn as_slice(&self) -> Option<&[T]> {
        let header = self.header()?;
        // SAFETY: see get().
        let header = unsafe { header.as_ref() };
        if header.is_destroyed() {
            return None;
        }
        // SAFETY: non-destroyed payloads hold `length` live elements of T.
        Some(unsafe {
            std::slice::from_raw_parts(header.payload().cast::<T>(), header.length.get())
        })
    }

    /// Whether the handle points at nothing (or at a destroyed object).
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.get().is_none()
    }

    /// Point this handle at `other`'s target.
    ///
    /// The assignment is observed by the collector no later than the start
    /// of the next collection (deferred write barrier).
    pub fn set(&self, other: &Handle<T>) {
        let _ = crate::gc::try_with_gc(|gc| {
            self.retarget(other.slot_ref().target.get());
            gc.enqueue_barrier(self.slot);
        });
    }

    /// Null this handle.
    pub fn clear(&self) {
        let _ = crate::gc::try_with_gc(|gc| {
            self.retarget(std::ptr::null_mut());
            gc.enqueue_barrier(self.slot);
        });
    }

    fn retarget(&self, new: *mut ObjHeader) {
        if let Some(header) = NonNull::new(new) {
            // SAFETY: a live handle's target header is allocated.
            unsafe { header.as_ref() }.retain();
        }
        let old = self.slot_ref().target.replace(new);
        if let Some(header) = NonNull::new(old) {
            // SAFETY: the old target was kept allocated by this handle's
            // reference until this release.
            unsafe { header.as_ref() }.release();
        }
    }

    /// Whether two handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(a: &Handle<T>, b: &Handle<T>) -> bool {
        a.slot_ref().target.get() == b.slot_ref().target.get()
    }
}

impl<T: 'static> Clone for Handle<T> {
    fn clone(&self) -> Self {
        let target = self.slot_ref().target.get();
        let slot = crate::gc::with_gc(|gc| {
            let slot = gc.slots().claim(target);
            if !target.is_null() {
                // Born with a target: rooted eagerly, like from_header.
                gc.root_insert(slot);
            }
            slot
        });
        Self {
            slot,
            _not_send: PhantomData,
        }
    }
}

impl<T: 'static> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: 'static> Drop for Handle<T> {
    fn drop(&mut self) {
        // During thread teardown the collector (and the arena with it) may
        // already be gone; the slot dies with it.
        let _ = crate::gc::try_with_gc(|gc| {
            let slot = self.slot_ref();
            if let Some(header) = NonNull::new(slot.target.get()) {
                // SAFETY: this handle's reference kept the header allocated.
                unsafe { header.as_ref() }.release();
            }
            slot.state.set(SlotState::Dead);
            gc.enqueue_unref(self.slot);
        });
    }
}

impl<T: 'static> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
            .expect("dereferenced a null or destroyed managed handle")
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Handle").field(value).finish(),
            None => f.write_str("Handle(null)"),
        }
    }
}

impl<T: fmt::Display + 'static> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => value.fmt(f),
            None => f.write_str("null"),
        }
    }
}

impl<T: PartialEq + 'static> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Eq + 'static> Eq for Handle<T> {}

impl<T: Hash + 'static> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get().hash(state);
    }
}

// ============================================================================
// Adoption and early destruction
// ============================================================================

/// Adopt a handle to an already-managed object from its payload pointer.
///
/// Intended for self-references inside [`new_managed_cyclic`]
/// initializers. The header is recovered by stepping back from the payload
/// and validating its magic byte; a pointer that does not belong to a
/// managed allocation yields a null handle.
///
/// [`new_managed_cyclic`]: crate::new_managed_cyclic
///
/// # Safety
///
/// `raw` must be null, a pointer into a managed allocation of `T`, or at
/// least point far enough into readable memory that the bytes where a
/// header would sit can be inspected.
#[must_use]
pub unsafe fn handle_from_raw<T: 'static>(raw: *const T) -> Handle<T> {
    let desc = TypeDesc::of::<T>();
    // SAFETY: forwarded caller contract.
    match unsafe { ObjHeader::from_payload(desc, raw.cast()) } {
        Some(header) => Handle::from_header(header),
        None => Handle::null(),
    }
}

/// Run the payload destructor immediately and null the handle.
///
/// The raw memory is reclaimed at the next sweep. Other handles to the same
/// allocation observe a destroyed target: `get` returns `None` and deref
/// panics.
pub fn force_destroy<T: 'static>(handle: &Handle<T>) {
    if let Some(header) = handle.header() {
        // SAFETY: a live handle's target header is allocated.
        unsafe { header.as_ref() }.destroy();
    }
    handle.clear();
}
