//! Execution contexts: a value stack plus the per-thread indexes the closure
//! manager maintains over it.

use std::collections::BTreeMap;

use luma_core::{ObjectId, Tag, Value};

use crate::core::ManagedObject;
use crate::errors::RuntimeError;
use crate::func::TbcList;
use crate::{Runtime, fatal};

pub struct Thread {
    /// Slot 0 is the base of the stack and never holds a variable.
    pub(crate) stack: Vec<Value>,
    /// Open upvalue cells keyed by the stack level they refer to.
    pub(crate) open_upvalues: BTreeMap<usize, ObjectId>,
    pub(crate) tbc: TbcList,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Thread {
    pub fn new() -> Self {
        Self {
            stack: vec![Value::NIL],
            open_upvalues: BTreeMap::new(),
            tbc: TbcList::new(),
        }
    }

    /// First free level.
    #[inline]
    pub fn top(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    #[track_caller]
    pub fn get(&self, level: usize) -> Value {
        match self.stack.get(level) {
            Some(v) => *v,
            None => fatal("stack level above top"),
        }
    }

    #[inline]
    #[track_caller]
    pub fn set(&mut self, level: usize, v: Value) {
        match self.stack.get_mut(level) {
            Some(slot) => *slot = v,
            None => fatal("stack level above top"),
        }
    }

    pub fn push(&mut self, v: Value) -> usize {
        self.stack.push(v);
        self.stack.len() - 1
    }

    /// Grow with nils or shrink to `top` slots. The base slot always stays.
    pub fn set_top(&mut self, top: usize) {
        self.stack.resize(top.max(1), Value::NIL);
    }

    pub fn open_upvalue_count(&self) -> usize {
        self.open_upvalues.len()
    }

    /// Level of the innermost pending to-be-closed variable.
    pub fn tbc_top(&self) -> Option<usize> {
        self.tbc.top()
    }
}

impl Runtime {
    pub fn new_thread(&mut self) -> Result<Value, RuntimeError> {
        let id = self.alloc(ManagedObject::Thread(Box::new(Thread::new())))?;
        Ok(Value::from_object(Tag::THREAD, id))
    }

    /// Make `thread` the context that stack and upvalue operations act on.
    pub fn set_current_thread(&mut self, thread: Value) {
        self.current = thread.expect_object(Tag::THREAD);
    }

    pub fn current_thread(&self) -> Value {
        Value::from_object(Tag::THREAD, self.current)
    }

    #[track_caller]
    pub(crate) fn thread_ref(&self, id: ObjectId) -> &Thread {
        match self.heap.get(id) {
            ManagedObject::Thread(t) => t,
            _ => fatal("object is not a thread"),
        }
    }

    #[track_caller]
    pub(crate) fn thread_mut(&mut self, id: ObjectId) -> &mut Thread {
        match self.heap.get_mut(id) {
            ManagedObject::Thread(t) => t,
            _ => fatal("object is not a thread"),
        }
    }

    pub fn thread(&self, v: Value) -> &Thread {
        self.thread_ref(v.expect_object(Tag::THREAD))
    }

    // Stack access on the current thread.

    pub fn push(&mut self, v: Value) -> usize {
        let cur = self.current;
        self.thread_mut(cur).push(v)
    }

    pub fn top(&self) -> usize {
        self.thread_ref(self.current).top()
    }

    pub fn set_top(&mut self, top: usize) {
        let cur = self.current;
        self.thread_mut(cur).set_top(top);
    }

    #[track_caller]
    pub fn stack_get(&self, level: usize) -> Value {
        self.thread_ref(self.current).get(level)
    }

    #[track_caller]
    pub fn stack_set(&mut self, level: usize, v: Value) {
        let cur = self.current;
        self.thread_mut(cur).set(level, v);
    }
}
