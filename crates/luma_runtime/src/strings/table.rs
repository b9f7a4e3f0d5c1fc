//! Hash table of interned short strings.
//!
//! Buckets hold the head of a chain threaded through the strings' own
//! `hnext` links, so rehashing only moves links and never touches the heap
//! allocator.

use luma_core::{ObjectId, str_hash};
use tracing::{debug, warn};

use super::LuaString;
use crate::core::{Heap, ManagedObject};
use crate::errors::RuntimeError;
use crate::fatal;

const BUCKET_BYTES: usize = std::mem::size_of::<Option<ObjectId>>();

fn string(heap: &Heap, id: ObjectId) -> &LuaString {
    match heap.get(id) {
        ManagedObject::ShortStr(s) => s,
        _ => fatal("string table entry is not a short string"),
    }
}

fn string_mut(heap: &mut Heap, id: ObjectId) -> &mut LuaString {
    match heap.get_mut(id) {
        ManagedObject::ShortStr(s) => s,
        _ => fatal("string table entry is not a short string"),
    }
}

pub struct StringTable {
    buckets: Vec<Option<ObjectId>>,
    used: usize,
    seed: u32,
}

impl StringTable {
    /// Empty table of `size` buckets; the bucket array is charged to the
    /// heap's memory account.
    pub fn new(heap: &mut Heap, seed: u32, size: usize) -> Result<Self, RuntimeError> {
        debug_assert!(size.is_power_of_two());
        if !heap.account.try_charge(size * BUCKET_BYTES) {
            return Err(RuntimeError::OutOfMemory);
        }
        Ok(Self {
            buckets: vec![None; size],
            used: 0,
            seed,
        })
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of interned strings.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        str_hash(bytes, self.seed)
    }

    #[inline]
    fn bucket_of(&self, h: u32) -> usize {
        (h as usize) & (self.buckets.len() - 1)
    }

    /// Entry with exactly these bytes, dead or alive.
    pub fn find(&self, heap: &Heap, bytes: &[u8], h: u32) -> Option<ObjectId> {
        let mut p = self.buckets[self.bucket_of(h)];
        while let Some(id) = p {
            let s = string(heap, id);
            if s.len() == bytes.len() && s.as_bytes() == bytes {
                return Some(id);
            }
            p = s.hnext;
        }
        None
    }

    /// Link a freshly allocated short string at the head of its bucket.
    pub(crate) fn insert(&mut self, heap: &mut Heap, id: ObjectId) {
        let b = self.bucket_of(string(heap, id).hash);
        string_mut(heap, id).hnext = self.buckets[b];
        self.buckets[b] = Some(id);
        self.used += 1;
    }

    /// Unlink a string from its bucket. Called by the sweeper only.
    pub fn remove(&mut self, heap: &mut Heap, id: ObjectId) {
        let b = self.bucket_of(string(heap, id).hash);
        let next = string(heap, id).hnext;
        if self.buckets[b] == Some(id) {
            self.buckets[b] = next;
        } else {
            let mut p = self.buckets[b];
            loop {
                let Some(prev) = p else {
                    fatal("removed string is not in its bucket");
                };
                let after = string(heap, prev).hnext;
                if after == Some(id) {
                    string_mut(heap, prev).hnext = next;
                    break;
                }
                p = after;
            }
        }
        string_mut(heap, id).hnext = None;
        self.used -= 1;
    }

    /// Re-chain every entry found in buckets `0..osize` by `hash mod nsize`.
    /// The bucket vector must already span both sizes.
    fn rehash(&mut self, heap: &mut Heap, osize: usize, nsize: usize) {
        let mask = nsize - 1;
        for i in osize..nsize {
            self.buckets[i] = None;
        }
        for i in 0..osize {
            let mut p = self.buckets[i].take();
            while let Some(id) = p {
                let s = string_mut(heap, id);
                p = s.hnext;
                let h = (s.hash as usize) & mask;
                s.hnext = self.buckets[h];
                self.buckets[h] = Some(id);
            }
        }
    }

    /// Change the bucket count to `nsize` (a power of two). Returns false,
    /// leaving the table exactly as it was, if the larger bucket array
    /// cannot be allocated.
    pub fn resize(&mut self, heap: &mut Heap, nsize: usize) -> bool {
        debug_assert!(nsize.is_power_of_two());
        let osize = self.buckets.len();
        if nsize == osize {
            return true;
        }
        if nsize < osize {
            self.rehash(heap, osize, nsize);
            self.buckets.truncate(nsize);
            self.buckets.shrink_to_fit();
            heap.account.release((osize - nsize) * BUCKET_BYTES);
        } else {
            let extra = (nsize - osize) * BUCKET_BYTES;
            if !heap.account.try_charge(extra) {
                warn!(from = osize, to = nsize, "string table resize abandoned");
                return false;
            }
            if self.buckets.try_reserve_exact(nsize - osize).is_err() {
                heap.account.release(extra);
                warn!(from = osize, to = nsize, "string table resize abandoned");
                return false;
            }
            self.buckets.resize(nsize, None);
            self.rehash(heap, osize, nsize);
        }
        debug!(from = osize, to = nsize, used = self.used, "string table resized");
        true
    }

    /// Every entry, bucket by bucket.
    pub fn entries(&self, heap: &Heap) -> Vec<ObjectId> {
        let mut out = Vec::with_capacity(self.used);
        for head in &self.buckets {
            let mut p = *head;
            while let Some(id) = p {
                out.push(id);
                p = string(heap, id).hnext;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(words: &[&str]) -> (Heap, StringTable, Vec<ObjectId>) {
        let mut heap = Heap::new(None);
        let mut tb = StringTable::new(&mut heap, 7, 4).unwrap();
        let mut ids = Vec::new();
        for w in words {
            let h = tb.hash(w.as_bytes());
            let id = heap
                .alloc(ManagedObject::ShortStr(LuaString::new(w.as_bytes(), h)))
                .unwrap();
            tb.insert(&mut heap, id);
            ids.push(id);
        }
        (heap, tb, ids)
    }

    #[test]
    fn grow_and_shrink_keep_entries() {
        let words = ["a", "b", "c", "d", "e", "f", "g"];
        let (mut heap, mut tb, ids) = table_with(&words);
        assert!(tb.resize(&mut heap, 16));
        assert!(tb.resize(&mut heap, 2));
        assert_eq!(tb.size(), 2);
        for (w, id) in words.iter().zip(&ids) {
            assert_eq!(tb.find(&heap, w.as_bytes(), tb.hash(w.as_bytes())), Some(*id));
        }
        assert_eq!(tb.entries(&heap).len(), words.len());
    }

    #[test]
    fn remove_unlinks_middle_of_chain() {
        let (mut heap, mut tb, ids) = table_with(&["x", "y", "z"]);
        assert!(tb.resize(&mut heap, 1));
        tb.remove(&mut heap, ids[1]);
        assert_eq!(tb.used(), 2);
        assert_eq!(tb.find(&heap, b"y", tb.hash(b"y")), None);
        assert_eq!(tb.find(&heap, b"z", tb.hash(b"z")), Some(ids[2]));
        assert_eq!(tb.find(&heap, b"x", tb.hash(b"x")), Some(ids[0]));
    }

    #[test]
    fn failed_growth_leaves_table_untouched() {
        let (mut heap, mut tb, _) = table_with(&["p", "q"]);
        let before = tb.entries(&heap);
        heap.account.set_limit(Some(heap.bytes_used()));
        assert!(!tb.resize(&mut heap, 64));
        assert_eq!(tb.size(), 4);
        assert_eq!(tb.entries(&heap), before);
    }
}
