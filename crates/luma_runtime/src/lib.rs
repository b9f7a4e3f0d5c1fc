//! Luma runtime object model.
//!
//! Heap and collector, interned strings, closures with their upvalue cells,
//! to-be-closed variables, function templates and the precompiled chunk
//! format.

#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]

pub mod chunk;
pub mod config;
pub mod core;
pub mod errors;
pub mod func;
pub mod gc;
mod runtime;
pub mod strings;
pub mod thread;
pub mod userdata;

pub use chunk::{dump, dump_to_vec, undump};
pub use config::RuntimeConfig;
pub use core::{Heap, ManagedObject};
pub use errors::{DumpError, LoadError, RuntimeError};
pub use func::{CloseDispatch, CloseStatus, Proto, UpvalState};
pub use gc::GcPhase;
pub use runtime::Runtime;
pub use strings::LuaString;
pub use thread::Thread;

pub use luma_core::{Kind, NativeId, ObjectId, Tag, Value};

/// Abort on a broken internal invariant. These are bugs, not recoverable
/// errors.
#[cold]
#[track_caller]
pub(crate) fn fatal(msg: &str) -> ! {
    panic!("internal consistency violation: {msg}")
}
