use std::fmt;

use crossbeam_epoch::Guard;

use super::densemap::DenseIntMap;
use crate::error::Result;

/// A [`DenseIntMap`] paired with a pinned [`Guard`].
///
/// Returned by [`DenseIntMap::pin`]. References it hands out live as long as
/// the handle. Keep handles short-lived: while one exists, memory freed by
/// other threads' writes cannot be reclaimed.
pub struct DenseIntMapRef<'map, V> {
    map: &'map DenseIntMap<V>,
    guard: Guard,
}

impl<'map, V> DenseIntMapRef<'map, V>
where
    V: Send + Sync + 'static,
{
    pub(crate) fn new(map: &'map DenseIntMap<V>, guard: Guard) -> Self {
        Self { map, guard }
    }

    pub fn map(&self) -> &'map DenseIntMap<V> {
        self.map
    }

    pub fn get(&self, key: i32) -> Result<Option<&V>> {
        self.map.get(key, &self.guard)
    }

    pub fn contains_key(&self, key: i32) -> Result<bool> {
        self.map.is_occupied(key, &self.guard)
    }

    pub fn put(&self, key: i32, value: V) -> Result<Option<&V>> {
        self.map.put(key, value, &self.guard)
    }

    pub fn compare_and_put(&self, key: i32, existing: Option<&V>, value: V) -> Result<bool>
    where
        V: PartialEq,
    {
        self.map.compare_and_put(key, existing, value, &self.guard)
    }

    pub fn remove(&self, key: i32) -> Result<Option<&V>> {
        self.map.remove(key, &self.guard)
    }

    pub fn size(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(i32, &V),
    {
        self.map.for_each(f)
    }

    pub fn par_for_each<F>(&self, f: F)
    where
        F: Fn(i32, &V) + Sync + Send,
    {
        self.map.par_for_each(f)
    }

    pub fn keys(&self) -> Vec<i32> {
        self.map.keys()
    }

    /// Lets reclamation make progress without dropping the handle.
    pub fn repin(&mut self) {
        self.guard.repin();
    }
}

impl<V> fmt::Debug for DenseIntMapRef<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DenseIntMapRef").field(self.map).finish()
    }
}
