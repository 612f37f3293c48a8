//! A concurrent map from dense, non-negative integer keys to values.
//!
//! Keys are used directly as indexes into a backing array of slots. The array
//! is published through a single epoch-protected pointer: readers load it once
//! and never take a lock, while growth builds a larger copy and swaps it in.
//!
//! Writers hold `resize_lock` shared while they swap a slot and adjust the size
//! counter, so writers to different keys proceed in parallel. Growth holds it
//! exclusively, which keeps a slot swap from landing in an array that is about
//! to be replaced.

use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use log::{debug, trace, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;

use super::map_ref::DenseIntMapRef;
use crate::config::{GrowthPolicy, DEFAULT_CAPACITY};
use crate::error::{Error, Result};
use crate::util::Counter;

/// The contents of one slot as observed under a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'g, V> {
    Empty,
    Occupied(&'g V),
}

impl<'g, V> From<Slot<'g, V>> for Option<&'g V> {
    fn from(slot: Slot<'g, V>) -> Self {
        match slot {
            Slot::Empty => None,
            Slot::Occupied(value) => Some(value),
        }
    }
}

fn load<'g, V>(slot: &Atomic<V>, guard: &'g Guard) -> Slot<'g, V> {
    let value = slot.load(Ordering::Acquire, guard);
    // safety: values are only freed through `defer_destroy` after being unlinked,
    // so anything reachable while `guard` is pinned outlives the guard.
    match unsafe { value.as_ref() } {
        Some(value) => Slot::Occupied(value),
        None => Slot::Empty,
    }
}

/// Backing array. Dropping a table never drops the values it points to: after
/// a growth the old and new table share them.
struct Table<V> {
    slots: Vec<Atomic<V>>,
}

impl<V> Table<V> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Atomic::null()).collect(),
        }
    }

    fn try_new(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|source| Error::Allocation { capacity, source })?;
        slots.resize_with(capacity, Atomic::null);
        Ok(Self { slots })
    }

    /// Copy of `self` with `capacity` slots, every existing slot at the same index.
    fn grown(&self, capacity: usize, guard: &Guard) -> Result<Self> {
        let table = Self::try_new(capacity)?;
        for (new, old) in table.slots.iter().zip(&self.slots) {
            new.store(old.load(Ordering::Acquire, guard), Ordering::Relaxed);
        }
        Ok(table)
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn slot<'g>(&self, index: usize, guard: &'g Guard) -> Slot<'g, V> {
        match self.slots.get(index) {
            Some(slot) => load(slot, guard),
            None => Slot::Empty,
        }
    }

    #[inline]
    fn is_occupied(&self, index: usize, guard: &Guard) -> bool {
        self.slots
            .get(index)
            .map_or(false, |slot| !slot.load(Ordering::Acquire, guard).is_null())
    }
}

#[inline]
fn index_of(key: i32) -> Result<usize> {
    usize::try_from(key).map_err(|_| Error::InvalidKey(key))
}

// Only indexes reachable from an `i32` key are ever occupied.
#[inline]
fn key_of(index: usize) -> i32 {
    index as i32
}

/// A growable concurrent map keyed by node ordinals.
///
/// Lookups are lock-free. Inserts and removals on distinct keys run in
/// parallel; a `put` past the end of the backing array first grows it, which
/// briefly excludes other writers but never readers.
///
/// Methods that hand out references take a [`Guard`] from
/// [`crossbeam_epoch::pin`]; the references stay valid for as long as that
/// guard lives. [`DenseIntMap::pin`] bundles a guard with the map for callers
/// that do not want to manage one.
///
/// ```
/// use synchronized::DenseIntMap;
///
/// let map = DenseIntMap::with_capacity(100);
/// let guard = crossbeam_epoch::pin();
/// map.put(0, "value0".to_string(), &guard).unwrap();
/// assert_eq!(map.get(0, &guard).unwrap(), Some(&"value0".to_string()));
/// assert_eq!(map.get(1000, &guard).unwrap(), None);
/// assert!(map.get(-1, &guard).is_err());
/// ```
pub struct DenseIntMap<V> {
    table: Atomic<Table<V>>,
    resize_lock: RwLock<()>,
    size: Counter,
    policy: GrowthPolicy,
}

impl<V> DenseIntMap<V> {
    fn from_table(table: Table<V>, policy: GrowthPolicy) -> Self {
        trace!("new dense int map with {} slots, {:?}", table.len(), policy);
        Self {
            table: Atomic::new(table),
            resize_lock: RwLock::new(()),
            size: Counter::new(),
            policy,
        }
    }

    /// Creates a map with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a map whose backing array holds keys `0..capacity` without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_policy(capacity, GrowthPolicy::default())
    }

    pub fn with_capacity_and_policy(capacity: usize, policy: GrowthPolicy) -> Self {
        Self::from_table(Table::new(capacity), policy)
    }

    /// Like [`with_capacity`](Self::with_capacity), but reports allocation
    /// failure instead of aborting.
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        let table = Table::try_new(capacity).map_err(|err| {
            warn!("{}", err);
            err
        })?;
        Ok(Self::from_table(table, GrowthPolicy::default()))
    }

    /// Number of occupied slots.
    ///
    /// Exact whenever no `put` or `remove` is in flight. While writers run on
    /// other threads it may lag behind or run ahead of those writes.
    pub fn size(&self) -> usize {
        self.size.sum().max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current length of the backing array. Never decreases.
    pub fn capacity(&self) -> usize {
        let guard = epoch::pin();
        self.current(&guard).len()
    }

    pub fn growth_policy(&self) -> GrowthPolicy {
        self.policy
    }

    fn current<'g>(&'g self, guard: &'g Guard) -> &'g Table<V> {
        let table = self.table.load(Ordering::Acquire, guard);
        // safety: the table pointer is non-null from construction until drop, and a
        // replaced table is only destroyed once every guard pinned before the swap
        // is gone.
        unsafe { table.deref() }
    }

    fn check_guard(&self, guard: &Guard) {
        if let Some(collector) = guard.collector() {
            assert!(
                collector == epoch::default_collector(),
                "guard must come from the default collector"
            );
        }
    }
}

impl<V> DenseIntMap<V>
where
    V: Send + Sync + 'static,
{
    /// Pins the current thread and returns a handle that carries its own guard.
    pub fn pin(&self) -> DenseIntMapRef<'_, V> {
        DenseIntMapRef::new(self, epoch::pin())
    }

    /// Returns the value stored under `key`.
    ///
    /// Keys beyond the backing array are simply absent.
    pub fn get<'g>(&'g self, key: i32, guard: &'g Guard) -> Result<Option<&'g V>> {
        Ok(self.slot(key, guard)?.into())
    }

    /// Reads the slot for `key` without taking any lock.
    pub fn slot<'g>(&'g self, key: i32, guard: &'g Guard) -> Result<Slot<'g, V>> {
        let index = index_of(key)?;
        self.check_guard(guard);
        Ok(self.current(guard).slot(index, guard))
    }

    pub fn get_cloned(&self, key: i32) -> Result<Option<V>>
    where
        V: Clone,
    {
        let guard = epoch::pin();
        Ok(self.get(key, &guard)?.cloned())
    }

    /// Whether `key` is occupied. Pins internally since no reference escapes;
    /// [`DenseIntMapRef::contains_key`] reuses its handle's guard instead.
    pub fn contains_key(&self, key: i32) -> Result<bool> {
        self.is_occupied(key, &epoch::pin())
    }

    pub(crate) fn is_occupied(&self, key: i32, guard: &Guard) -> Result<bool> {
        let index = index_of(key)?;
        self.check_guard(guard);
        Ok(self.current(guard).is_occupied(index, guard))
    }

    /// Associates `value` with `key`, growing the backing array if `key` lies
    /// past its end. Returns the value previously stored under `key`.
    ///
    /// If growth cannot allocate, the error is returned and the map is unchanged.
    pub fn put<'g>(&'g self, key: i32, value: V, guard: &'g Guard) -> Result<Option<&'g V>> {
        let index = index_of(key)?;
        self.check_guard(guard);

        let _scope = self.write_scope(index, guard)?;
        let slot = &self.current(guard).slots[index];
        let old = slot.swap(Owned::new(value), Ordering::AcqRel, guard);
        if old.is_null() {
            self.size.inc();
            return Ok(None);
        }

        // safety: `old` is no longer reachable from any table published after the
        // swap. Threads that read it earlier are pinned, which delays the free.
        unsafe {
            guard.defer_destroy(old);
            Ok(Some(old.deref()))
        }
    }

    /// Installs `value` under `key` only if the slot currently holds `existing`
    /// (`None` meaning empty). Returns whether the value was installed.
    pub fn compare_and_put(
        &self,
        key: i32,
        existing: Option<&V>,
        value: V,
        guard: &Guard,
    ) -> Result<bool>
    where
        V: PartialEq,
    {
        let index = index_of(key)?;
        self.check_guard(guard);

        let _scope = self.write_scope(index, guard)?;
        let slot = &self.current(guard).slots[index];
        let mut new = Owned::new(value);
        let mut current = slot.load(Ordering::Acquire, guard);
        loop {
            // safety: see `load`.
            let matches = match (unsafe { current.as_ref() }, existing) {
                (None, None) => true,
                (Some(current), Some(existing)) => current == existing,
                _ => false,
            };
            if !matches {
                return Ok(false);
            }

            match slot.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire, guard) {
                Ok(_) => {
                    if current.is_null() {
                        self.size.inc();
                    } else {
                        // safety: unlinked by the exchange above.
                        unsafe { guard.defer_destroy(current) };
                    }
                    return Ok(true);
                }
                Err(err) => {
                    current = err.current;
                    new = err.new;
                }
            }
        }
    }

    /// Empties the slot for `key`, returning what it held.
    ///
    /// Removing an absent key, including one past the end of the backing
    /// array, is a no-op.
    pub fn remove<'g>(&'g self, key: i32, guard: &'g Guard) -> Result<Option<&'g V>> {
        let index = index_of(key)?;
        self.check_guard(guard);

        if !self.current(guard).is_occupied(index, guard) {
            return Ok(None);
        }

        let _scope = self.resize_lock.read();
        // Reload: a growth may have published a new table before we got the lock.
        let slot = &self.current(guard).slots[index];
        let old = slot.swap(Shared::null(), Ordering::AcqRel, guard);
        if old.is_null() {
            return Ok(None);
        }
        self.size.dec();

        // safety: as in `put`.
        unsafe {
            guard.defer_destroy(old);
            Ok(Some(old.deref()))
        }
    }

    /// Calls `f` for every occupied slot, in ascending key order.
    ///
    /// The walk covers the backing array current at the time of the call.
    /// Concurrent writes may or may not be observed.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(i32, &V),
    {
        let guard = epoch::pin();
        for (index, slot) in self.current(&guard).slots.iter().enumerate() {
            if let Slot::Occupied(value) = load(slot, &guard) {
                f(key_of(index), value);
            }
        }
    }

    /// Parallel [`for_each`](Self::for_each) on the rayon pool. Visit order is unspecified.
    pub fn par_for_each<F>(&self, f: F)
    where
        F: Fn(i32, &V) + Sync + Send,
    {
        let guard = epoch::pin();
        let table = self.current(&guard);
        table
            .slots
            .par_iter()
            .enumerate()
            .for_each_init(epoch::pin, |local, (index, slot)| {
                if let Slot::Occupied(value) = load(slot, local) {
                    f(key_of(index), value);
                }
            });
    }

    /// Snapshot of the occupied keys, ascending.
    pub fn keys(&self) -> Vec<i32> {
        let mut keys = Vec::with_capacity(self.size());
        self.for_each(|key, _| keys.push(key));
        keys
    }

    /// Acquires the shared write scope for a slot at `index`, growing first if
    /// the backing array is too short.
    fn write_scope(&self, index: usize, guard: &Guard) -> Result<RwLockReadGuard<'_, ()>> {
        // Capacity only grows, so a passing check stays valid once the lock is held.
        if index < self.current(guard).len() {
            return Ok(self.resize_lock.read());
        }
        self.grow(index + 1, guard)
    }

    fn grow(&self, required: usize, guard: &Guard) -> Result<RwLockReadGuard<'_, ()>> {
        let lock = self.resize_lock.write();

        let old = self.current(guard);
        if required <= old.len() {
            return Ok(RwLockWriteGuard::downgrade(lock));
        }

        let capacity = self.policy.next_capacity(old.len(), required);
        let table = old.grown(capacity, guard).map_err(|err| {
            warn!("dense int map growth failed: {}", err);
            err
        })?;
        debug!("growing dense int map from {} to {} slots", old.len(), capacity);

        let previous = self.table.swap(Owned::new(table), Ordering::AcqRel, guard);
        // safety: `previous` is unreachable once swapped out. Its values now also
        // live in the new table, and dropping a `Table` leaves them alone.
        unsafe { guard.defer_destroy(previous) };

        // Downgrade so the triggering write happens before any other grower runs.
        Ok(RwLockWriteGuard::downgrade(lock))
    }
}

impl<V> Default for DenseIntMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for DenseIntMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseIntMap")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<V> Drop for DenseIntMap<V> {
    fn drop(&mut self) {
        // safety: we have `&mut self`, and every reference handed out is bound to a
        // borrow of `self`, so nothing else can observe the table.
        let guard = unsafe { epoch::unprotected() };
        let table = self.table.swap(Shared::null(), Ordering::Relaxed, guard);
        if table.is_null() {
            return;
        }

        // safety: as above; we are the sole owner of the current table and the
        // values it points to. Earlier tables were queued without their values.
        let table = unsafe { table.into_owned() };
        for slot in table.slots.iter() {
            let value = slot.swap(Shared::null(), Ordering::Relaxed, guard);
            if !value.is_null() {
                drop(unsafe { value.into_owned() });
            }
        }
    }
}
