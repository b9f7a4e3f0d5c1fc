//! Script and native closures.

use luma_core::{NativeId, ObjectId, Tag, Value};

use super::{Proto, UpVal};
use crate::core::ManagedObject;
use crate::errors::RuntimeError;
use crate::{Runtime, fatal};

/// Closure over a function template. Slots start empty and are filled with
/// upvalue cells by the caller.
pub struct ScriptClosure {
    pub(crate) proto: Option<ObjectId>,
    pub(crate) upvals: Box<[Option<ObjectId>]>,
}

impl ScriptClosure {
    pub fn proto(&self) -> Option<ObjectId> {
        self.proto
    }

    pub fn upvalues(&self) -> &[Option<ObjectId>] {
        &self.upvals
    }
}

/// Native callable with captured values.
pub struct NativeClosure {
    pub f: NativeId,
    pub(crate) upvalues: Box<[Value]>,
}

impl NativeClosure {
    pub fn upvalues(&self) -> &[Value] {
        &self.upvalues
    }
}

impl Runtime {
    pub fn new_native_closure(&mut self, f: NativeId, n: usize) -> Result<Value, RuntimeError> {
        let id = self.alloc(ManagedObject::NativeClosure(NativeClosure {
            f,
            upvalues: vec![Value::NIL; n].into_boxed_slice(),
        }))?;
        Ok(Value::native_closure(id))
    }

    pub fn new_script_closure(&mut self, n: usize) -> Result<Value, RuntimeError> {
        let id = self.alloc(ManagedObject::ScriptClosure(ScriptClosure {
            proto: None,
            upvals: vec![None; n].into_boxed_slice(),
        }))?;
        Ok(Value::script_closure(id))
    }

    #[track_caller]
    pub fn script_closure(&self, cl: Value) -> &ScriptClosure {
        match self.heap.get(cl.expect_object(Tag::SCRIPT_CLOSURE)) {
            ManagedObject::ScriptClosure(c) => c,
            _ => fatal("closure header does not match its value"),
        }
    }

    #[track_caller]
    fn script_closure_mut(&mut self, cl: Value) -> &mut ScriptClosure {
        match self.heap.get_mut(cl.expect_object(Tag::SCRIPT_CLOSURE)) {
            ManagedObject::ScriptClosure(c) => c,
            _ => fatal("closure header does not match its value"),
        }
    }

    #[track_caller]
    pub fn native_closure(&self, cl: Value) -> &NativeClosure {
        match self.heap.get(cl.expect_object(Tag::NATIVE_CLOSURE)) {
            ManagedObject::NativeClosure(c) => c,
            _ => fatal("closure header does not match its value"),
        }
    }

    pub fn set_closure_proto(&mut self, cl: Value, proto: ObjectId) {
        debug_assert_eq!(self.heap.tag(proto), Tag::PROTO);
        self.script_closure_mut(cl).proto = Some(proto);
        self.barrier(cl.as_object(), Value::from_object(Tag::PROTO, proto));
    }

    /// Store upvalue cell `uv` in slot `i` of a script closure.
    pub fn set_closure_upvalue(&mut self, cl: Value, i: usize, uv: ObjectId) {
        debug_assert_eq!(self.heap.tag(uv), Tag::UPVALUE);
        self.script_closure_mut(cl).upvals[i] = Some(uv);
        self.barrier(cl.as_object(), Value::from_object(Tag::UPVALUE, uv));
    }

    /// Upvalue cell in slot `i`, if filled.
    pub fn closure_upvalue(&self, cl: Value, i: usize) -> Option<ObjectId> {
        self.script_closure(cl).upvals.get(i).copied().flatten()
    }

    /// Fill every slot of a script closure with a fresh closed cell holding
    /// nil.
    pub fn init_upvalues(&mut self, cl: Value) -> Result<(), RuntimeError> {
        let n = self.script_closure(cl).upvals.len();
        self.gc_temp_roots.push(cl);
        let mut result = Ok(());
        for i in 0..n {
            match self.alloc(ManagedObject::Upvalue(UpVal::closed(Value::NIL))) {
                Ok(uv) => self.set_closure_upvalue(cl, i, uv),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.gc_temp_roots.pop();
        result
    }

    pub fn native_upvalue(&self, cl: Value, i: usize) -> Option<Value> {
        self.native_closure(cl).upvalues.get(i).copied()
    }

    pub fn set_native_upvalue(&mut self, cl: Value, i: usize, v: Value) -> bool {
        let owner = cl.expect_object(Tag::NATIVE_CLOSURE);
        let slot = match self.heap.get_mut(owner) {
            ManagedObject::NativeClosure(c) => c.upvalues.get_mut(i),
            _ => fatal("closure header does not match its value"),
        };
        let Some(slot) = slot else {
            return false;
        };
        *slot = v;
        self.barrier(owner, v);
        true
    }

    /// Move a finished template onto the heap.
    pub fn alloc_proto(&mut self, proto: Proto) -> Result<ObjectId, RuntimeError> {
        self.alloc(ManagedObject::Proto(Box::new(proto)))
    }

    #[track_caller]
    pub fn proto(&self, id: ObjectId) -> &Proto {
        match self.heap.get(id) {
            ManagedObject::Proto(p) => p,
            _ => fatal("object is not a function template"),
        }
    }
}
