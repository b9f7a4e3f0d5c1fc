//! To-be-closed variables.
//!
//! Each thread keeps its pending to-be-closed variables as a chain of
//! markers running down the stack: the marker at a level stores the
//! distance to the previous marker in 16 bits. Gaps wider than that are
//! bridged with zero-distance placeholder markers.

use luma_core::Value;
use tracing::trace;

use crate::errors::RuntimeError;
use crate::{Runtime, fatal};

/// Widest gap one marker can span.
pub const MAX_DELTA: usize = u16::MAX as usize;

#[derive(Debug, Clone, Default)]
pub struct TbcList {
    /// Delta per stack level; only meaningful at marker levels.
    deltas: Vec<u16>,
    /// Level of the innermost marker; 0 is the stack base (no marker).
    top: usize,
}

impl TbcList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<usize> {
        (self.top > 0).then_some(self.top)
    }

    fn set_delta(&mut self, level: usize, delta: u16) {
        if self.deltas.len() <= level {
            self.deltas.resize(level + 1, 0);
        }
        self.deltas[level] = delta;
    }

    #[track_caller]
    pub fn push(&mut self, level: usize) {
        if level <= self.top {
            fatal("to-be-closed variables must be registered in stack order");
        }
        while level - self.top > MAX_DELTA {
            self.top += MAX_DELTA;
            self.set_delta(self.top, 0);
        }
        self.set_delta(level, (level - self.top) as u16);
        self.top = level;
    }

    /// Remove the innermost marker and any placeholders below it. Returns
    /// the removed marker's level.
    #[track_caller]
    pub fn pop(&mut self) -> usize {
        let level = self.top;
        let delta = self.deltas.get(level).copied().unwrap_or(0) as usize;
        if level == 0 || delta == 0 {
            fatal("popping an empty to-be-closed list");
        }
        let mut p = level - delta;
        while p > 0 && self.deltas[p] == 0 {
            p -= MAX_DELTA;
        }
        self.top = p;
        level
    }

    /// Whether a registered variable (not a placeholder) sits at `level`.
    pub fn contains(&self, level: usize) -> bool {
        let mut p = self.top;
        while p > level {
            p -= match self.deltas[p] {
                0 => MAX_DELTA,
                d => d as usize,
            };
        }
        p == level && level > 0 && self.deltas[p] != 0
    }

    /// Every marker level from the innermost down, placeholders included.
    pub fn markers(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut p = self.top;
        while p > 0 {
            out.push(p);
            p -= match self.deltas[p] {
                0 => MAX_DELTA,
                d => d as usize,
            };
        }
        out
    }
}

/// How the scope being closed was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    Normal,
    /// Unwinding with this error object in flight.
    Error(Value),
}

impl CloseStatus {
    /// Second argument handed to closing methods.
    pub fn error_object(self) -> Value {
        match self {
            CloseStatus::Normal => Value::NIL,
            CloseStatus::Error(e) => e,
        }
    }
}

/// Closing-method lookup and invocation, supplied by the interpreter.
pub trait CloseDispatch {
    /// The closing method of `value`, if it has one.
    fn close_method(&mut self, rt: &Runtime, value: Value) -> Option<Value>;

    /// Call `method(value, err)`. Suspension is only allowed when
    /// `yieldable` is set.
    fn call_close(
        &mut self,
        rt: &mut Runtime,
        method: Value,
        value: Value,
        err: Value,
        yieldable: bool,
    ) -> Result<(), RuntimeError>;

    /// Debug name of the variable stored at `level`.
    fn variable_name(&self, _rt: &Runtime, _level: usize) -> Option<String> {
        None
    }
}

impl Runtime {
    fn non_closable(&self, dispatch: &dyn CloseDispatch, level: usize) -> RuntimeError {
        RuntimeError::NonClosable {
            name: dispatch
                .variable_name(self, level)
                .unwrap_or_else(|| "?".to_string()),
        }
    }

    /// Register the variable at `level` of the current thread as
    /// to-be-closed. False and nil need no closing and are skipped.
    pub fn register_to_be_closed(
        &mut self,
        level: usize,
        dispatch: &mut dyn CloseDispatch,
    ) -> Result<(), RuntimeError> {
        let v = self.stack_get(level);
        if v.is_falsy() {
            return Ok(());
        }
        if dispatch.close_method(self, v).is_none() {
            return Err(self.non_closable(dispatch, level));
        }
        let cur = self.current;
        self.thread_mut(cur).tbc.push(level);
        Ok(())
    }

    /// Close upvalues down to `level`, then call the closing methods of every
    /// to-be-closed variable at or above it, innermost first. An error
    /// raised by a closing method stops the walk and is returned.
    pub fn close_to_level(
        &mut self,
        level: usize,
        status: CloseStatus,
        yieldable: bool,
        dispatch: &mut dyn CloseDispatch,
    ) -> Result<(), RuntimeError> {
        self.close_upvalues_from(level);
        let mut closed = 0usize;
        loop {
            let cur = self.current;
            let th = self.thread_mut(cur);
            match th.tbc.top() {
                Some(t) if t >= level => {}
                _ => break,
            }
            let tbc = th.tbc.pop();
            let value = th.get(tbc);
            let Some(method) = dispatch.close_method(self, value) else {
                return Err(self.non_closable(dispatch, tbc));
            };
            closed += 1;
            dispatch.call_close(self, method, value, status.error_object(), yieldable)?;
        }
        trace!(level, closed, "closed to-be-closed variables");
        Ok(())
    }

    /// Unwinding variant of `close_to_level`: never yields, and when a
    /// closing method raises, keeps closing the remaining variables with
    /// that error as the new status. Returns the final status.
    pub fn close_protected(
        &mut self,
        level: usize,
        status: CloseStatus,
        dispatch: &mut dyn CloseDispatch,
    ) -> CloseStatus {
        let mut status = status;
        loop {
            match self.close_to_level(level, status, false, dispatch) {
                Ok(()) => return status,
                Err(e) => status = CloseStatus::Error(self.error_object(e)),
            }
        }
    }
}
