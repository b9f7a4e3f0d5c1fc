//! Direct-mapped cache of recently created strings, keyed by the address of
//! the caller's byte buffer.

use luma_core::ObjectId;
use smallvec::SmallVec;

use crate::core::Heap;

pub struct StringCache {
    sets: Vec<SmallVec<[ObjectId; 2]>>,
}

impl StringCache {
    /// Every way of every set starts out holding `filler`, a fixed string.
    pub fn new(sets: usize, ways: usize, filler: ObjectId) -> Self {
        Self {
            sets: (0..sets).map(|_| SmallVec::from_elem(filler, ways)).collect(),
        }
    }

    #[inline]
    fn set_index(&self, bytes: &[u8]) -> usize {
        (bytes.as_ptr() as usize) % self.sets.len()
    }

    /// Cached string with the same content as `bytes`; a hit moves the entry
    /// to the front of its set.
    pub fn lookup(&mut self, heap: &Heap, bytes: &[u8]) -> Option<ObjectId> {
        let i = self.set_index(bytes);
        let set = &mut self.sets[i];
        let pos = set.iter().position(|&id| {
            heap.get(id)
                .as_string()
                .is_some_and(|s| s.as_bytes() == bytes)
        })?;
        let id = set[pos];
        set[..=pos].rotate_right(1);
        Some(id)
    }

    /// Record a miss: shift the set and put `id` in front.
    pub fn insert(&mut self, bytes: &[u8], id: ObjectId) {
        let i = self.set_index(bytes);
        let set = &mut self.sets[i];
        set.rotate_right(1);
        set[0] = id;
    }

    /// Replace entries about to be collected with `filler`. Runs after
    /// marking, before the sweep.
    pub fn clear(&mut self, heap: &Heap, filler: ObjectId) {
        for set in &mut self.sets {
            for id in set.iter_mut() {
                if heap.is_white(*id) {
                    *id = filler;
                }
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.sets.iter().flat_map(|s| s.iter().copied())
    }
}
