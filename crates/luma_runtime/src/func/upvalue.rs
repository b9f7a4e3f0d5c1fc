//! Upvalue cells: captured variables shared between closures.

use luma_core::{ObjectId, Value};
use tracing::trace;

use crate::core::ManagedObject;
use crate::errors::RuntimeError;
use crate::{Runtime, fatal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalState {
    /// The variable still lives in `thread`'s stack at `level`.
    Open { thread: ObjectId, level: usize },
    /// The cell owns the value.
    Closed(Value),
}

#[derive(Debug, Clone, Copy)]
pub struct UpVal {
    pub(crate) state: UpvalState,
    /// Captures a variable registered as to-be-closed when the cell was
    /// opened.
    pub tbc: bool,
}

impl UpVal {
    pub fn closed(v: Value) -> Self {
        Self {
            state: UpvalState::Closed(v),
            tbc: false,
        }
    }

    pub fn state(&self) -> UpvalState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, UpvalState::Open { .. })
    }
}

impl Runtime {
    #[track_caller]
    pub(crate) fn upval(&self, id: ObjectId) -> &UpVal {
        match self.heap.get(id) {
            ManagedObject::Upvalue(uv) => uv,
            _ => fatal("object is not an upvalue"),
        }
    }

    #[track_caller]
    fn upval_mut(&mut self, id: ObjectId) -> &mut UpVal {
        match self.heap.get_mut(id) {
            ManagedObject::Upvalue(uv) => uv,
            _ => fatal("object is not an upvalue"),
        }
    }

    pub fn upvalue_state(&self, uv: ObjectId) -> UpvalState {
        self.upval(uv).state
    }

    pub fn upvalue_is_tbc(&self, uv: ObjectId) -> bool {
        self.upval(uv).tbc
    }

    /// Current value of the captured variable.
    pub fn upvalue_get(&self, uv: ObjectId) -> Value {
        match self.upval(uv).state {
            UpvalState::Open { thread, level } => self.thread_ref(thread).get(level),
            UpvalState::Closed(v) => v,
        }
    }

    /// Assign the captured variable, wherever it currently lives.
    pub fn upvalue_set(&mut self, uv: ObjectId, v: Value) {
        match self.upval(uv).state {
            UpvalState::Open { thread, level } => self.thread_mut(thread).set(level, v),
            UpvalState::Closed(_) => {
                self.upval_mut(uv).state = UpvalState::Closed(v);
                self.barrier(uv, v);
            }
        }
    }

    /// The open cell for `level` of the current thread, created on first
    /// request so that every closure capturing the slot shares it.
    pub fn find_or_make_open_upvalue(&mut self, level: usize) -> Result<ObjectId, RuntimeError> {
        let cur = self.current;
        if let Some(&uv) = self.thread_ref(cur).open_upvalues.get(&level) {
            debug_assert!(!self.heap.is_dead(uv));
            return Ok(uv);
        }
        let tbc = self.thread_ref(cur).tbc.contains(level);
        let uv = self.alloc(ManagedObject::Upvalue(UpVal {
            state: UpvalState::Open { thread: cur, level },
            tbc,
        }))?;
        self.thread_mut(cur).open_upvalues.insert(level, uv);
        Ok(uv)
    }

    /// Close every open cell of the current thread at or above `level`,
    /// highest level first: the stack value moves into the cell and the cell
    /// leaves the open index.
    pub fn close_upvalues_from(&mut self, level: usize) {
        let cur = self.current;
        let closing = self.thread_mut(cur).open_upvalues.split_off(&level);
        let count = closing.len();
        for (lvl, uv) in closing.into_iter().rev() {
            let v = self.thread_ref(cur).get(lvl);
            self.upval_mut(uv).state = UpvalState::Closed(v);
            if !self.heap.is_white(uv) {
                // Closed cells are never gray.
                self.heap.mark_black(uv);
                self.barrier(uv, v);
            }
        }
        if count > 0 {
            trace!(level, count, "closed upvalues");
        }
    }

    pub fn new_closed_upvalue(&mut self, v: Value) -> Result<ObjectId, RuntimeError> {
        self.alloc(ManagedObject::Upvalue(UpVal::closed(v)))
    }
}
