//! String objects, the short-string table and the string cache.

mod cache;
mod table;

pub use cache::StringCache;
pub use table::StringTable;

use luma_core::ObjectId;

/// Heap string. Short strings are interned; long strings are not.
pub struct LuaString {
    /// Short strings: reserved-word index (0 if none).
    /// Long strings: 1 once `hash` holds the content hash.
    pub(crate) extra: u8,
    /// Short strings: content hash. Long strings: seed until hashed.
    pub(crate) hash: u32,
    /// Next entry in the same string-table bucket.
    pub(crate) hnext: Option<ObjectId>,
    /// Payload followed by a terminating zero byte.
    data: Box<[u8]>,
}

impl LuaString {
    pub(crate) fn new(bytes: &[u8], hash: u32) -> Self {
        let mut data = Vec::with_capacity(bytes.len() + 1);
        data.extend_from_slice(bytes);
        data.push(0);
        Self {
            extra: 0,
            hash,
            hnext: None,
            data: data.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.data.len() - 1]
    }

    /// Payload including the terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_field(&self) -> u32 {
        self.hash
    }

    pub fn extra(&self) -> u8 {
        self.extra
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}
