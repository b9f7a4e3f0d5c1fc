//! Core types for the Luma runtime.
//!
//! This crate contains the fundamental types that are independent of the heap:
//! - `Tag` / `Kind` - the one-byte type-tag algebra shared by values and heap objects
//! - `Value` - the tagged (payload, tag) value representation
//! - `ObjectId` - handle to heap-allocated objects
//! - `str_hash` - the seeded string hash used by the string table

pub mod gc;
pub mod hash;
pub mod tag;
pub mod value;

pub use gc::ObjectId;
pub use hash::{random_seed, str_hash};
pub use tag::{Kind, Tag};
pub use value::{NativeId, Value};
