//! Full userdata: a raw byte block plus a fixed array of user values.

use luma_core::{Tag, Value};

use crate::core::ManagedObject;
use crate::errors::RuntimeError;
use crate::{Runtime, fatal};

pub struct Userdata {
    pub(crate) data: Box<[u8]>,
    pub(crate) user_values: Box<[Value]>,
}

impl Userdata {
    pub(crate) fn try_new(size: usize, n_user_values: usize) -> Result<Self, RuntimeError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| RuntimeError::OutOfMemory)?;
        data.resize(size, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
            user_values: vec![Value::NIL; n_user_values].into_boxed_slice(),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn user_values(&self) -> &[Value] {
        &self.user_values
    }
}

impl Runtime {
    /// Allocate a userdata block of `size` bytes with `n_user_values` nil
    /// user values.
    pub fn new_userdata(&mut self, size: usize, n_user_values: usize) -> Result<Value, RuntimeError> {
        let overhead = n_user_values.saturating_mul(std::mem::size_of::<Value>());
        if size > (isize::MAX as usize).saturating_sub(overhead) {
            return Err(RuntimeError::TooBig);
        }
        self.reserve(size)?;
        let ud = Userdata::try_new(size, n_user_values)?;
        let id = self.alloc(ManagedObject::Userdata(ud))?;
        Ok(Value::userdata(id))
    }

    pub fn userdata(&self, v: Value) -> &Userdata {
        match self.heap.get(v.expect_object(Tag::USERDATA)) {
            ManagedObject::Userdata(u) => u,
            _ => fatal("userdata header does not match its value"),
        }
    }

    pub fn userdata_mut(&mut self, v: Value) -> &mut Userdata {
        match self.heap.get_mut(v.expect_object(Tag::USERDATA)) {
            ManagedObject::Userdata(u) => u,
            _ => fatal("userdata header does not match its value"),
        }
    }

    /// Store user value `n`, applying the write barrier.
    pub fn set_user_value(&mut self, ud: Value, n: usize, v: Value) -> bool {
        let owner = ud.expect_object(Tag::USERDATA);
        let slots = &mut self.userdata_mut(ud).user_values;
        let Some(slot) = slots.get_mut(n) else {
            return false;
        };
        *slot = v;
        self.barrier_back(owner, v);
        true
    }
}
