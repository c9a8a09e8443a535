//! Managed containers.
//!
//! Handles living inside `Vec`, `VecDeque` or a map move whenever the
//! container reallocates, so their offsets cannot be frozen; these adapters
//! install custom enumerators that walk the container's current state on
//! every cycle. Containers carry a `RefCell` for mutation through the
//! shared reference a handle gives out.
//!
//! Keys of managed maps must not contain handles; only values are traced.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::enumerate::{HandleContainer, RawHandle};
use crate::gc::new_managed_container;
use crate::ptr::{force_destroy, Handle};
use crate::registry::{ensure_registered, TypeDesc};

/// A managed vector of handles.
pub type HandleVec<T> = Handle<RefCell<Vec<Handle<T>>>>;
/// A managed deque of handles.
pub type HandleDeque<T> = Handle<RefCell<VecDeque<Handle<T>>>>;
/// A managed hash map with handle values.
pub type HandleMap<K, V> = Handle<RefCell<HashMap<K, Handle<V>>>>;
/// A managed ordered map with handle values.
pub type HandleBTreeMap<K, V> = Handle<RefCell<BTreeMap<K, Handle<V>>>>;

/// Allocate an empty managed vector of handles.
#[must_use]
pub fn new_managed_vec<T: 'static>() -> HandleVec<T> {
    new_managed_container(RefCell::new(Vec::new()))
}

/// Allocate an empty managed deque of handles.
#[must_use]
pub fn new_managed_deque<T: 'static>() -> HandleDeque<T> {
    new_managed_container(RefCell::new(VecDeque::new()))
}

/// Allocate an empty managed hash map with handle values.
#[must_use]
pub fn new_managed_map<K, V>() -> HandleMap<K, V>
where
    K: std::hash::Hash + Eq + 'static,
    V: 'static,
{
    new_managed_container(RefCell::new(HashMap::new()))
}

/// Allocate an empty managed ordered map with handle values.
#[must_use]
pub fn new_managed_btree_map<K, V>() -> HandleBTreeMap<K, V>
where
    K: Ord + 'static,
    V: 'static,
{
    new_managed_container(RefCell::new(BTreeMap::new()))
}

// The enumerators read through `RefCell::as_ptr` instead of borrowing: a
// collection can start while a RefMut is active (allocating while holding
// one), but single-threading means nothing mutates the container during the
// walk itself.

// SAFETY: visits every handle currently stored in the vector.
unsafe impl<T: 'static> HandleContainer for RefCell<Vec<Handle<T>>> {
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle)) {
        // SAFETY: see module note on as_ptr.
        let vec = unsafe { &*self.as_ptr() };
        for handle in vec {
            visit(RawHandle::of(handle));
        }
    }
}

// SAFETY: visits every handle currently stored in the deque.
unsafe impl<T: 'static> HandleContainer for RefCell<VecDeque<Handle<T>>> {
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle)) {
        // SAFETY: see module note on as_ptr.
        let deque = unsafe { &*self.as_ptr() };
        for handle in deque {
            visit(RawHandle::of(handle));
        }
    }
}

// SAFETY: visits every value handle; keys are not traced by contract.
unsafe impl<K: 'static, V: 'static> HandleContainer for RefCell<HashMap<K, Handle<V>>> {
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle)) {
        // SAFETY: see module note on as_ptr.
        let map = unsafe { &*self.as_ptr() };
        for handle in map.values() {
            visit(RawHandle::of(handle));
        }
    }
}

// SAFETY: visits every value handle; keys are not traced by contract.
unsafe impl<K: 'static, V: 'static> HandleContainer for RefCell<BTreeMap<K, Handle<V>>> {
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle)) {
        // SAFETY: see module note on as_ptr.
        let map = unsafe { &*self.as_ptr() };
        for handle in map.values() {
            visit(RawHandle::of(handle));
        }
    }
}

// ============================================================================
// Flat vectors of compound elements
// ============================================================================

/// A vector of compound elements that embed handles at fixed offsets.
///
/// Element handles are found through the element type's frozen offset
/// table, so the factory registers `T` eagerly (constructing and destroying
/// a probe instance if `T` was never allocated before).
#[derive(Debug, Default)]
pub struct FlatVec<T: 'static>(pub Vec<T>);

/// A managed vector of compound elements.
pub type HandleFlatVec<T> = Handle<RefCell<FlatVec<T>>>;

// SAFETY: walks every element through the element type's offset table; the
// factory guarantees the table is frozen before the container exists.
unsafe impl<T: 'static> HandleContainer for RefCell<FlatVec<T>> {
    fn for_each_handle(&self, visit: &mut dyn FnMut(RawHandle)) {
        // SAFETY: see module note on as_ptr.
        let vec = &unsafe { &*self.as_ptr() }.0;
        let desc = TypeDesc::of::<T>();
        crate::enumerate::enumerate_by_offsets(vec.as_ptr().cast(), vec.len(), desc, visit);
    }
}

/// Allocate an empty managed vector of compound elements.
#[must_use]
pub fn new_managed_flat_vec<T: Default + 'static>() -> HandleFlatVec<T> {
    ensure_registered::<T>();
    new_managed_container(RefCell::new(FlatVec(Vec::new())))
}

// ============================================================================
// Bulk destruction
// ============================================================================

/// Containers whose elements can be force-destroyed in bulk.
pub trait ManagedElements {
    /// Run the destructor of every element's target now and clear the
    /// container. Memory is reclaimed at the next sweep.
    fn destroy_elements(&self);
}

impl<T: 'static> ManagedElements for HandleVec<T> {
    fn destroy_elements(&self) {
        if let Some(cell) = self.get() {
            let mut vec = cell.borrow_mut();
            for handle in vec.iter() {
                force_destroy(handle);
            }
            vec.clear();
        }
    }
}

impl<T: 'static> ManagedElements for HandleDeque<T> {
    fn destroy_elements(&self) {
        if let Some(cell) = self.get() {
            let mut deque = cell.borrow_mut();
            for handle in deque.iter() {
                force_destroy(handle);
            }
            deque.clear();
        }
    }
}

impl<K: 'static, V: 'static> ManagedElements for HandleMap<K, V> {
    fn destroy_elements(&self) {
        if let Some(cell) = self.get() {
            let mut map = cell.borrow_mut();
            for handle in map.values() {
                force_destroy(handle);
            }
            map.clear();
        }
    }
}

impl<K: 'static, V: 'static> ManagedElements for HandleBTreeMap<K, V> {
    fn destroy_elements(&self) {
        if let Some(cell) = self.get() {
            let mut map = cell.borrow_mut();
            for handle in map.values() {
                force_destroy(handle);
            }
            map.clear();
        }
    }
}
