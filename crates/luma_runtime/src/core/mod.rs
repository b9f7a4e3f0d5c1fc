//! Core runtime infrastructure.
//!
//! - `Heap` - slot storage, collector colors and the memory budget
//! - `ManagedObject` - the heap object variants

pub mod heap;
pub mod object;

pub use heap::{Heap, MemoryAccount};
pub use object::ManagedObject;
