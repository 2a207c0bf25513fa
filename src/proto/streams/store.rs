use super::stream::Stream;
use crate::frame::StreamId;

use indexmap::IndexMap;
use slab::Slab;

/// Storage for streams
///
/// Entries live in a slab; the id map preserves insertion order so that
/// data scheduling can round-robin streams fairly.
#[derive(Debug, Default)]
pub(super) struct Store {
    slab: Slab<Stream>,
    ids: IndexMap<StreamId, usize>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.ids.contains_key(&id)
    }

    pub fn insert(&mut self, id: StreamId, val: Stream) -> &mut Stream {
        let key = self.slab.insert(val);
        let evicted = self.ids.insert(id, key);
        debug_assert!(evicted.is_none(), "duplicate stream id {:?}", id);

        &mut self.slab[key]
    }

    pub fn find_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        let key = *self.ids.get(&id)?;
        Some(&mut self.slab[key])
    }

    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        // shift_remove keeps the remaining ids in insertion order.
        let key = self.ids.shift_remove(&id)?;
        Some(self.slab.remove(key))
    }

    /// Stream ids in insertion order.
    pub fn ids(&self) -> Vec<StreamId> {
        self.ids.keys().copied().collect()
    }

    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Stream),
    {
        for (_, &key) in self.ids.iter() {
            f(&mut self.slab[key]);
        }
    }

    /// Remove every stream satisfying the predicate, returning them.
    pub fn drain_filter<F>(&mut self, mut f: F) -> Vec<Stream>
    where
        F: FnMut(&Stream) -> bool,
    {
        let doomed: Vec<StreamId> = self
            .ids
            .iter()
            .filter(|(_, &key)| f(&self.slab[key]))
            .map(|(&id, _)| id)
            .collect();

        doomed
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}
