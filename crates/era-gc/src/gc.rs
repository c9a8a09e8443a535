//! The collector: generations, pre-mark, mark, sweep, promotion.
//!
//! One collector exists per thread, created on first use and torn down at
//! thread exit (the teardown destroys everything still alive, best effort).
//! Allocation is the only point where a collection may start; handle
//! construction, assignment and destruction merely enqueue work that the
//! next collection reconciles.

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ptr::NonNull;

use crate::enumerate::{HandleContainer, RawHandle};
use crate::header::{Color, ObjHeader};
use crate::list::GenList;
use crate::metrics::{CollectionType, GcMetrics, GcStats, PhaseTimer};
use crate::policy::{CollectInfo, CountPolicy, GcPolicy};
use crate::ptr::{Handle, HandleSlot, SlotArena, SlotState};
use crate::registry::TypeDesc;
use crate::trace_log::internal::{collection_span, phase_end, phase_start, GcPhase};

/// Raw allocation override; must return a pointer valid for `layout` or
/// null on exhaustion.
pub type AllocFn = fn(Layout) -> *mut u8;
/// Raw deallocation override, paired with [`AllocFn`].
pub type DeallocFn = fn(*mut u8, Layout);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Generation {
    Young,
    Old,
}

struct SweepOutcome {
    freed: usize,
    freed_bytes: usize,
    surviving: usize,
}

// ============================================================================
// Collector state
// ============================================================================

pub(crate) struct Collector {
    young: GenList,
    old: GenList,
    /// Allocations whose initializers are currently running, innermost last.
    /// Excluded from pre-mark (their payloads may be partially built) and
    /// treated as marked roots by any collection that runs meanwhile.
    creating: RefCell<Vec<NonNull<ObjHeader>>>,
    /// Root handles currently known to the collector.
    roots: RefCell<HashSet<NonNull<HandleSlot>>>,
    /// Handles embedded in old-generation allocations that may point into
    /// the young generation.
    remembered: RefCell<HashSet<NonNull<HandleSlot>>>,
    /// Handles whose latest assignment has not been reconciled yet.
    pending_barrier: RefCell<Vec<NonNull<HandleSlot>>>,
    /// Handles whose destructors fired; removal from the sets is deferred
    /// to the next reconciliation so destruction never walks the tables.
    pending_unrefs: RefCell<Vec<NonNull<HandleSlot>>>,
    /// Reusable explicit mark stack.
    temp: RefCell<Vec<NonNull<ObjHeader>>>,
    slots: SlotArena,
    policy: RefCell<Box<dyn GcPolicy>>,
    scan_age_to_promote: Cell<u8>,
    in_collect: Cell<bool>,
    allocs_since_gc: Cell<usize>,
    freed_last_cycle: Cell<usize>,
    young_collections: Cell<usize>,
    full_collections: Cell<usize>,
    young_bytes: Cell<usize>,
    old_bytes: Cell<usize>,
    alloc_hooks: Cell<Option<(AllocFn, DeallocFn)>>,
    last_metrics: Cell<GcMetrics>,
}

thread_local! {
    static COLLECTOR: Collector = Collector::new();
}

pub(crate) fn with_gc<R>(f: impl FnOnce(&Collector) -> R) -> R {
    COLLECTOR.with(f)
}

/// Collector access that degrades to a no-op during thread teardown.
pub(crate) fn try_with_gc<R>(f: impl FnOnce(&Collector) -> R) -> Option<R> {
    COLLECTOR.try_with(f).ok()
}

impl Collector {
    fn new() -> Self {
        Self {
            young: GenList::new(),
            old: GenList::new(),
            creating: RefCell::new(Vec::new()),
            roots: RefCell::new(HashSet::new()),
            remembered: RefCell::new(HashSet::new()),
            pending_barrier: RefCell::new(Vec::new()),
            pending_unrefs: RefCell::new(Vec::new()),
            temp: RefCell::new(Vec::new()),
            slots: SlotArena::new(),
            policy: RefCell::new(Box::new(CountPolicy::default())),
            scan_age_to_promote: Cell::new(2),
            in_collect: Cell::new(false),
            allocs_since_gc: Cell::new(0),
            freed_last_cycle: Cell::new(0),
            young_collections: Cell::new(0),
            full_collections: Cell::new(0),
            young_bytes: Cell::new(0),
            old_bytes: Cell::new(0),
            alloc_hooks: Cell::new(None),
            last_metrics: Cell::new(GcMetrics::default()),
        }
    }

    pub(crate) fn slots(&self) -> &SlotArena {
        &self.slots
    }

    pub(crate) fn enqueue_barrier(&self, slot: NonNull<HandleSlot>) {
        self.pending_barrier.borrow_mut().push(slot);
    }

    /// Root a handle born with a target. The entry persists until the
    /// handle's destruction reconciles it away; the pre-mark pass only
    /// flips the classification flag when the handle turns out to be
    /// embedded, which is what lets a constructor-taken self-reference keep
    /// its object alive until it is explicitly nulled.
    pub(crate) fn root_insert(&self, slot: NonNull<HandleSlot>) {
        self.roots.borrow_mut().insert(slot);
    }

    pub(crate) fn enqueue_unref(&self, slot: NonNull<HandleSlot>) {
        self.pending_unrefs.borrow_mut().push(slot);
    }

    fn collect_info(&self) -> CollectInfo {
        CollectInfo {
            allocs_since_gc: self.allocs_since_gc.get(),
            young_count: self.young.len(),
            old_count: self.old.len(),
            young_bytes: self.young_bytes.get(),
            old_bytes: self.old_bytes.get(),
            young_collections: self.young_collections.get(),
            full_collections: self.full_collections.get(),
        }
    }

    pub(crate) fn last_metrics(&self) -> GcMetrics {
        self.last_metrics.get()
    }

    pub(crate) fn stats(&self) -> GcStats {
        let mut live = 0;
        for list in [&self.young, &self.old] {
            let mut cursor = list.first();
            while let Some(h) = cursor {
                // SAFETY: generation lists link only live headers.
                cursor = unsafe { GenList::next_of(h) };
                if !unsafe { h.as_ref() }.is_destroyed() {
                    live += 1;
                }
            }
        }
        GcStats {
            young_objects: self.young.len(),
            old_objects: self.old.len(),
            live_objects: live,
            young_bytes: self.young_bytes.get(),
            old_bytes: self.old_bytes.get(),
            freed_last_cycle: self.freed_last_cycle.get(),
            young_collections: self.young_collections.get(),
            full_collections: self.full_collections.get(),
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn generation_counts(&self) -> (usize, usize) {
        (self.young.len(), self.old.len())
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn root_set_len(&self) -> usize {
        self.roots.borrow().len()
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    fn before_alloc(&self) {
        if self.in_collect.get() {
            return;
        }
        self.allocs_since_gc.set(self.allocs_since_gc.get() + 1);
        let want = self.policy.borrow_mut().want_young(&self.collect_info());
        if want {
            self.collect_young_inner();
            let full = self.policy.borrow_mut().want_full(&self.collect_info());
            if full {
                self.collect_full_inner();
            }
        }
    }

    unsafe fn alloc_raw(&self, layout: Layout) -> *mut u8 {
        let ptr = match self.alloc_hooks.get() {
            Some((alloc, _)) => alloc(layout),
            // SAFETY: layout always covers at least the header.
            None => unsafe { std::alloc::alloc(layout) },
        };
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        ptr
    }

    unsafe fn dealloc_header(&self, h: NonNull<ObjHeader>) {
        // SAFETY: caller passes an unlinked, destroyed header it owns.
        let hdr = unsafe { h.as_ref() };
        let layout = layout_for(hdr.desc, hdr.alloc_len);
        let ptr = h.as_ptr().cast::<u8>();
        match self.alloc_hooks.get() {
            Some((_, dealloc)) => dealloc(ptr, layout),
            // SAFETY: allocated with the same layout in alloc_raw.
            None => unsafe { std::alloc::dealloc(ptr, layout) },
        }
    }

    fn allocate<T: 'static>(
        &self,
        desc: &'static TypeDesc,
        n: usize,
        init: impl FnOnce(*mut T, &Cell<usize>),
    ) -> Handle<T> {
        self.before_alloc();

        let layout = layout_for(desc, n);
        // SAFETY: layout covers header + n elements.
        let raw = unsafe { self.alloc_raw(layout) };
        let color = if self.in_collect.get() {
            // Born during a collection (destructor-driven allocation): the
            // factory's root handle is not reconciled yet, so the newborn
            // must not look like garbage to the in-progress sweep.
            Color::Black
        } else {
            Color::White
        };
        let header = raw.cast::<ObjHeader>();
        // SAFETY: raw is fresh memory large enough for the header.
        unsafe { header.write(ObjHeader::new(desc, n, color)) };
        // SAFETY: header was just written.
        let header = unsafe { NonNull::new_unchecked(header) };
        // SAFETY: fresh header, linked nowhere yet.
        unsafe { self.young.push_back(header) };
        self.young_bytes
            .set(self.young_bytes.get() + n * desc.elem_size);
        self.creating.borrow_mut().push(header);

        let guard = InitGuard {
            gc: self,
            header,
            constructed: Cell::new(0),
        };
        // SAFETY: payload area of the fresh allocation.
        let payload = unsafe { header.as_ref() }.payload().cast::<T>();
        init(payload, &guard.constructed);
        debug_assert_eq!(guard.constructed.get(), n);
        std::mem::forget(guard);

        if n > 0 {
            // SAFETY: element 0 is fully initialized by now.
            unsafe { desc.freeze_offsets(payload.cast()) };
        }
        self.creating.borrow_mut().pop();
        Handle::from_header(header)
    }

    fn is_creating(&self, h: NonNull<ObjHeader>) -> bool {
        self.creating.borrow().contains(&h)
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Absorb the deferred queues into `roots`/`remembered`. Runs at the
    /// start of every collection, after pre-mark has refreshed the handle
    /// classifications.
    fn reconcile(&self) {
        let unrefs: Vec<_> = self.pending_unrefs.borrow_mut().drain(..).collect();
        if !unrefs.is_empty() {
            let mut roots = self.roots.borrow_mut();
            let mut remembered = self.remembered.borrow_mut();
            for slot in &unrefs {
                roots.remove(slot);
                remembered.remove(slot);
            }
        }

        let barrier: Vec<_> = self.pending_barrier.borrow_mut().drain(..).collect();
        if !barrier.is_empty() {
            let mut roots = self.roots.borrow_mut();
            let mut remembered = self.remembered.borrow_mut();
            for slot in barrier {
                // SAFETY: arena slots outlive every queue entry.
                let cell = unsafe { slot.as_ref() };
                if cell.state.get() != SlotState::Live {
                    continue;
                }
                if cell.is_root.get() {
                    roots.insert(slot);
                } else if cell.is_old.get() {
                    remembered.insert(slot);
                }
            }
        }

        // Dead slots are safe to recycle only now that every set and queue
        // has forgotten them.
        for slot in unrefs {
            self.slots.release(slot);
        }
    }

    // ------------------------------------------------------------------------
    // Pre-mark
    // ------------------------------------------------------------------------

    fn enumerate(&self, hdr: &ObjHeader, visit: &mut dyn FnMut(RawHandle)) {
        if hdr.is_destroyed() {
            return;
        }
        (hdr.desc.enumerate_fn)(hdr.payload().cast_const(), hdr.length.get(), hdr.desc, visit);
    }

    /// Refresh handle classifications and re-prime colors in one generation.
    ///
    /// Containers relocate their storage and handles are moved freely, so
    /// ownership, root status and generation flags of every embedded handle
    /// are re-derived from the allocations that actually contain them. The
    /// walked header's own color is reset too: young collections leave
    /// intergenerationally marked old headers Black, and the next
    /// collection of that generation must start from White.
    fn premark_gen(&self, gen: Generation) {
        let list = match gen {
            Generation::Young => &self.young,
            Generation::Old => &self.old,
        };
        let mut cursor = list.first();
        while let Some(h) = cursor {
            // SAFETY: cursor walks a generation list of live headers.
            cursor = unsafe { GenList::next_of(h) };
            if self.is_creating(h) {
                continue;
            }
            let hdr = unsafe { h.as_ref() };
            hdr.color.set(Color::White);
            if hdr.is_destroyed() || !hdr.has_sub_handles.get() {
                continue;
            }
            let mut any = false;
            self.enumerate(hdr, &mut |raw| {
                any = true;
                let slot = raw.slot();
                slot.owner.set(h.as_ptr());
                // Demotion changes how future barrier absorptions classify
                // the handle; an existing root-set entry stays until the
                // handle dies.
                slot.is_root.set(false);
                match gen {
                    Generation::Old => {
                        // Handles that appeared inside an old object after
                        // its promotion must join the remembered set, or the
                        // next young collection would miss their targets.
                        slot.is_old.set(true);
                        self.remembered.borrow_mut().insert(raw.0);
                    }
                    Generation::Young => {
                        if slot.is_old.replace(false) {
                            self.remembered.borrow_mut().remove(&raw.0);
                        }
                    }
                }
                if let Some(target) = raw.target() {
                    // SAFETY: a live handle's target header is allocated.
                    unsafe { target.as_ref() }.color.set(Color::White);
                }
            });
            if hdr.desc.fixed_layout {
                hdr.has_sub_handles.set(any);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Mark
    // ------------------------------------------------------------------------

    /// Mark everything reachable from `start`; returns how many headers were
    /// newly blackened.
    fn mark(&self, start: NonNull<ObjHeader>) -> usize {
        let mut marked = 0;
        let mut stack = self.temp.borrow_mut();
        stack.push(start);
        while let Some(h) = stack.pop() {
            // SAFETY: only live headers are pushed.
            let hdr = unsafe { h.as_ref() };
            if hdr.is_destroyed() || hdr.color.get() == Color::Black {
                continue;
            }
            hdr.color.set(Color::Black);
            marked += 1;
            if !hdr.has_sub_handles.get() {
                continue;
            }
            let stack = &mut *stack;
            self.enumerate(hdr, &mut |raw| {
                if let Some(target) = raw.target() {
                    // SAFETY: a live handle's target header is allocated.
                    let child = unsafe { target.as_ref() };
                    if !child.is_destroyed() && child.color.get() == Color::White {
                        stack.push(target);
                    }
                }
            });
        }
        marked
    }

    fn mark_creating(&self) -> usize {
        let creating: Vec<_> = self.creating.borrow().clone();
        let mut marked = 0;
        for h in creating {
            marked += self.mark(h);
        }
        marked
    }

    fn mark_roots(&self, include_old: bool) -> usize {
        let mut marked = self.mark_creating();
        {
            let roots = self.roots.borrow();
            for slot in roots.iter() {
                // SAFETY: reconciliation keeps only live slots in the sets.
                let cell = unsafe { slot.as_ref() };
                if !include_old && cell.is_old.get() {
                    continue;
                }
                if let Some(target) = NonNull::new(cell.target.get()) {
                    marked += self.mark(target);
                }
            }
        }
        if !include_old {
            let remembered = self.remembered.borrow();
            for slot in remembered.iter() {
                // SAFETY: as above.
                let cell = unsafe { slot.as_ref() };
                if let Some(target) = NonNull::new(cell.target.get()) {
                    marked += self.mark(target);
                }
            }
        }
        marked
    }

    // ------------------------------------------------------------------------
    // Sweep and promotion
    // ------------------------------------------------------------------------

    /// Sweep one generation. Destruction and reclamation run as separate
    /// passes so a destructor of one garbage object can still safely observe
    /// (and get `None` from) handles into another.
    fn sweep(&self, gen: Generation, full: bool) -> SweepOutcome {
        let list = match gen {
            Generation::Young => &self.young,
            Generation::Old => &self.old,
        };
        let mut garbage: Vec<NonNull<ObjHeader>> = Vec::new();
        let mut surviving = 0;
        let mut cursor = list.first();
        while let Some(h) = cursor {
            // SAFETY: cursor walks the generation list; next is captured
            // before h can be unlinked.
            cursor = unsafe { GenList::next_of(h) };
            if self.is_creating(h) {
                continue;
            }
            let hdr = unsafe { h.as_ref() };
            if hdr.is_destroyed() || hdr.color.get() == Color::White {
                hdr.destroy();
                // Destruction of this object (and of its neighbours in the
                // same cycle) drops embedded handles first; which destroyed
                // headers are still targeted settles before pass two.
                garbage.push(h);
            } else {
                surviving += 1;
                hdr.color.set(Color::White);
                if gen == Generation::Young && !full {
                    let age = hdr.scan_age.get().saturating_add(1);
                    if age >= self.scan_age_to_promote.get() {
                        hdr.scan_age.set(0);
                        // SAFETY: h is linked in young.
                        unsafe { self.promote(h) };
                    } else {
                        hdr.scan_age.set(age);
                    }
                }
            }
        }

        let mut freed = 0;
        let mut freed_bytes = 0;
        for &h in &garbage {
            let hdr = unsafe { h.as_ref() };
            if !hdr.is_unreferenced() {
                // Some live handle still targets this destroyed header
                // (force_destroy leaves such aliases behind). The header
                // stays linked as a tombstone until the last handle lets
                // go; a later sweep reclaims it.
                continue;
            }
            let bytes = hdr.size_in_bytes();
            freed += 1;
            freed_bytes += bytes;
            self.sub_gen_bytes(gen, bytes);
            // SAFETY: h is a destroyed, untargeted header still linked in
            // `list`; after unlinking nothing references it.
            unsafe {
                list.unlink(h);
                self.dealloc_header(h);
            }
        }
        SweepOutcome {
            freed,
            freed_bytes,
            surviving,
        }
    }

    fn sub_gen_bytes(&self, gen: Generation, bytes: usize) {
        let cell = match gen {
            Generation::Young => &self.young_bytes,
            Generation::Old => &self.old_bytes,
        };
        cell.set(cell.get().saturating_sub(bytes));
    }

    /// Move a young survivor to the old generation and remember its
    /// embedded handles so the next young collection still sees its
    /// references into the young generation.
    unsafe fn promote(&self, h: NonNull<ObjHeader>) {
        // SAFETY: caller guarantees h is linked in young.
        unsafe {
            self.young.unlink(h);
            self.old.push_back(h);
        }
        let hdr = unsafe { h.as_ref() };
        let bytes = hdr.size_in_bytes();
        self.young_bytes.set(self.young_bytes.get() - bytes);
        self.old_bytes.set(self.old_bytes.get() + bytes);
        let mut remembered = self.remembered.borrow_mut();
        self.enumerate(hdr, &mut |raw| {
            raw.slot().is_old.set(true);
            remembered.insert(raw.0);
        });
    }

    // ------------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------------

    pub(crate) fn collect_young_inner(&self) {
        if self.in_collect.replace(true) {
            return;
        }
        let _span = collection_span("young");
        let mut timer = PhaseTimer::start();

        phase_start(GcPhase::Premark);
        self.premark_gen(Generation::Young);
        phase_end(GcPhase::Premark, self.young.len());
        timer.end_premark();

        self.reconcile();

        phase_start(GcPhase::Mark);
        let marked = self.mark_roots(false);
        phase_end(GcPhase::Mark, marked);
        timer.end_mark();

        phase_start(GcPhase::Sweep);
        let outcome = self.sweep(Generation::Young, false);
        phase_end(GcPhase::Sweep, outcome.freed);
        timer.end_sweep();

        self.freed_last_cycle.set(outcome.freed);
        self.allocs_since_gc.set(0);
        self.young_collections.set(self.young_collections.get() + 1);
        self.store_metrics(CollectionType::Young, &timer, &outcome);
        self.in_collect.set(false);
    }

    pub(crate) fn collect_full_inner(&self) {
        if self.in_collect.replace(true) {
            return;
        }
        let _span = collection_span("full");
        let mut timer = PhaseTimer::start();

        phase_start(GcPhase::Premark);
        self.premark_gen(Generation::Young);
        self.premark_gen(Generation::Old);
        phase_end(GcPhase::Premark, self.young.len() + self.old.len());
        timer.end_premark();

        self.reconcile();

        phase_start(GcPhase::Mark);
        let marked = self.mark_roots(true);
        phase_end(GcPhase::Mark, marked);
        timer.end_mark();

        phase_start(GcPhase::Sweep);
        let young = self.sweep(Generation::Young, true);
        let old = self.sweep(Generation::Old, true);
        let outcome = SweepOutcome {
            freed: young.freed + old.freed,
            freed_bytes: young.freed_bytes + old.freed_bytes,
            surviving: young.surviving + old.surviving,
        };
        phase_end(GcPhase::Sweep, outcome.freed);
        timer.end_sweep();

        self.freed_last_cycle.set(outcome.freed);
        self.allocs_since_gc.set(0);
        self.full_collections.set(self.full_collections.get() + 1);
        self.store_metrics(CollectionType::Full, &timer, &outcome);
        self.in_collect.set(false);
    }

    fn store_metrics(&self, kind: CollectionType, timer: &PhaseTimer, outcome: &SweepOutcome) {
        self.last_metrics.set(GcMetrics {
            collection_type: kind,
            duration: timer.total(),
            premark_duration: timer.premark,
            mark_duration: timer.mark,
            sweep_duration: timer.sweep,
            objects_reclaimed: outcome.freed,
            bytes_reclaimed: outcome.freed_bytes,
            objects_surviving: outcome.surviving,
        });
    }
}

impl Drop for Collector {
    /// Thread teardown: destroy everything still alive, then reclaim the
    /// memory. Destruction runs for both generations before any memory is
    /// freed so cross-references between dying objects observe destroyed
    /// targets instead of freed ones; order among them is unspecified.
    fn drop(&mut self) {
        for list in [&self.young, &self.old] {
            let mut cursor = list.first();
            while let Some(h) = cursor {
                // SAFETY: generation lists hold live headers.
                cursor = unsafe { GenList::next_of(h) };
                unsafe { h.as_ref() }.destroy();
            }
        }
        for list in [&self.young, &self.old] {
            let mut cursor = list.first();
            while let Some(h) = cursor {
                cursor = unsafe { GenList::next_of(h) };
                // SAFETY: every payload is destroyed; nothing observes the
                // header after this point.
                unsafe {
                    list.unlink(h);
                    self.dealloc_header(h);
                }
            }
        }
    }
}

/// Cleans up a half-constructed allocation when an initializer panics: the
/// constructed prefix is destroyed, the header leaves `young` and the
/// creating stack, and the raw memory is freed. The object never becomes
/// reachable.
struct InitGuard<'a> {
    gc: &'a Collector,
    header: NonNull<ObjHeader>,
    constructed: Cell<usize>,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the header is linked and owned solely by the factory.
        let hdr = unsafe { self.header.as_ref() };
        let constructed = self.constructed.get();
        if constructed > 0 {
            // SAFETY: exactly `constructed` leading elements are live.
            unsafe { (hdr.desc.drop_fn)(hdr.payload(), constructed) };
        }
        hdr.length.set(0);
        self.gc
            .young_bytes
            .set(self.gc.young_bytes.get().saturating_sub(hdr.size_in_bytes()));
        self.gc.creating.borrow_mut().pop();
        // SAFETY: linked on young in allocate; unreachable by user code.
        unsafe {
            self.gc.young.unlink(self.header);
            self.gc.dealloc_header(self.header);
        }
    }
}

fn layout_for(desc: &TypeDesc, n: usize) -> Layout {
    let align = desc.elem_align.max(std::mem::align_of::<ObjHeader>());
    let size = n
        .checked_mul(desc.elem_size)
        .and_then(|payload| payload.checked_add(desc.payload_offset))
        .expect("allocation size overflow");
    Layout::from_size_align(size, align).expect("allocation size overflow")
}

// ============================================================================
// Public allocation and control surface
// ============================================================================

/// Allocate one managed `T`.
///
/// Returns a root handle to the new object. May run a collection first,
/// per the installed policy.
pub fn new_managed<T: 'static>(value: T) -> Handle<T> {
    with_gc(|gc| {
        gc.allocate(TypeDesc::of::<T>(), 1, |payload: *mut T, constructed| {
            // SAFETY: payload is the uninitialized element slot.
            unsafe { payload.write(value) };
            constructed.set(1);
        })
    })
}

/// Allocate a managed array of `n` elements, each produced by `init`.
pub fn new_managed_array<T: 'static>(n: usize, mut init: impl FnMut() -> T) -> Handle<T> {
    with_gc(|gc| {
        gc.allocate(TypeDesc::of::<T>(), n, |payload: *mut T, constructed| {
            for i in 0..n {
                let value = init();
                // SAFETY: slot i is within the n-element payload.
                unsafe { payload.add(i).write(value) };
                constructed.set(i + 1);
            }
        })
    })
}

/// Allocate one managed `T` whose initializer receives a pointer to the
/// object under construction, for self-references:
///
/// ```ignore
/// let node = new_managed_cyclic(|this| Node {
///     me: unsafe { handle_from_raw(this) },
///     value: 7,
/// });
/// ```
pub fn new_managed_cyclic<T: 'static>(f: impl FnOnce(*const T) -> T) -> Handle<T> {
    with_gc(|gc| {
        gc.allocate(TypeDesc::of::<T>(), 1, |payload: *mut T, constructed| {
            let value = f(payload.cast_const());
            // SAFETY: payload is the uninitialized element slot.
            unsafe { payload.write(value) };
            constructed.set(1);
        })
    })
}

/// Allocate a managed container with a custom handle enumerator.
///
/// Container types must always be allocated through this factory (or the
/// convenience factories in [`adapters`]); the plain factory would freeze
/// an offset table that cannot see the container's heap storage.
///
/// [`adapters`]: crate::adapters
pub fn new_managed_container<C: HandleContainer>(container: C) -> Handle<C> {
    with_gc(|gc| {
        gc.allocate(TypeDesc::of_container::<C>(), 1, |payload: *mut C, constructed| {
            // SAFETY: payload is the uninitialized element slot.
            unsafe { payload.write(container) };
            constructed.set(1);
        })
    })
}

/// Run a young collection; the policy may escalate it to a full one.
pub fn collect() {
    with_gc(|gc| {
        gc.collect_young_inner();
        let full = gc.policy.borrow_mut().want_full(&gc.collect_info());
        if full {
            gc.collect_full_inner();
        }
    });
}

/// Run a full collection over both generations.
pub fn collect_full() {
    with_gc(Collector::collect_full_inner);
}

/// Install the collection policy.
pub fn set_policy(policy: Box<dyn GcPolicy>) {
    with_gc(|gc| *gc.policy.borrow_mut() = policy);
}

/// Young-generation survivals before an allocation is promoted (min 1,
/// default 2).
pub fn set_scan_age_to_promote(age: u8) {
    with_gc(|gc| gc.scan_age_to_promote.set(age.max(1)));
}

/// Install raw allocation hooks. Must be called before the first managed
/// allocation on this thread.
///
/// # Panics
///
/// Panics if managed allocations already exist.
pub fn set_allocator(alloc: AllocFn, dealloc: DeallocFn) {
    with_gc(|gc| {
        assert!(
            gc.young.len() == 0 && gc.old.len() == 0,
            "allocator hooks must be installed before the first allocation"
        );
        gc.alloc_hooks.set(Some((alloc, dealloc)));
    });
}
