//! Heap object variants.

use luma_core::{ObjectId, Tag, Value};

use crate::func::{NativeClosure, Proto, ScriptClosure, UpVal, UpvalState};
use crate::strings::LuaString;
use crate::thread::Thread;
use crate::userdata::Userdata;

pub enum ManagedObject {
    ShortStr(LuaString),
    LongStr(LuaString),
    ScriptClosure(ScriptClosure),
    NativeClosure(NativeClosure),
    Upvalue(UpVal),
    Proto(Box<Proto>),
    Userdata(Userdata),
    Thread(Box<Thread>),
}

impl ManagedObject {
    /// Kind tag recorded for this object. Values referring to it carry the
    /// same tag.
    pub fn tag(&self) -> Tag {
        match self {
            ManagedObject::ShortStr(_) => Tag::SHORT_STR,
            ManagedObject::LongStr(_) => Tag::LONG_STR,
            ManagedObject::ScriptClosure(_) => Tag::SCRIPT_CLOSURE,
            ManagedObject::NativeClosure(_) => Tag::NATIVE_CLOSURE,
            ManagedObject::Upvalue(_) => Tag::UPVALUE,
            ManagedObject::Proto(_) => Tag::PROTO,
            ManagedObject::Userdata(_) => Tag::USERDATA,
            ManagedObject::Thread(_) => Tag::THREAD,
        }
    }

    /// Approximate footprint, charged against the memory budget.
    pub fn size(&self) -> usize {
        let base = std::mem::size_of::<ManagedObject>();
        let deep = match self {
            ManagedObject::ShortStr(s) | ManagedObject::LongStr(s) => s.len() + 1,
            ManagedObject::ScriptClosure(c) => {
                c.upvals.len() * std::mem::size_of::<Option<ObjectId>>()
            }
            ManagedObject::NativeClosure(c) => c.upvalues.len() * std::mem::size_of::<Value>(),
            ManagedObject::Upvalue(_) => 0,
            ManagedObject::Proto(p) => p.deep_size(),
            ManagedObject::Userdata(u) => {
                u.data.len() + u.user_values.len() * std::mem::size_of::<Value>()
            }
            // Stack growth is not charged; the estimate must not change while
            // the object lives.
            ManagedObject::Thread(_) => std::mem::size_of::<Thread>(),
        };
        base + deep
    }

    /// Push every object directly referenced by this one.
    pub(crate) fn trace(&self, out: &mut Vec<ObjectId>) {
        let values = |vs: &[Value], out: &mut Vec<ObjectId>| {
            out.extend(vs.iter().filter_map(Value::try_object));
        };
        match self {
            ManagedObject::ShortStr(_) | ManagedObject::LongStr(_) => {}
            ManagedObject::ScriptClosure(c) => {
                out.extend(c.proto);
                out.extend(c.upvals.iter().flatten().copied());
            }
            ManagedObject::NativeClosure(c) => values(&c.upvalues, out),
            ManagedObject::Upvalue(uv) => match uv.state {
                UpvalState::Open { thread, .. } => out.push(thread),
                UpvalState::Closed(v) => out.extend(v.try_object()),
            },
            ManagedObject::Proto(p) => {
                values(&p.constants, out);
                out.extend(p.source);
                out.extend(p.protos.iter().copied());
                out.extend(p.upvalues.iter().filter_map(|u| u.name));
                out.extend(p.loc_vars.iter().filter_map(|l| l.name));
            }
            ManagedObject::Userdata(u) => values(&u.user_values, out),
            ManagedObject::Thread(t) => {
                values(&t.stack, out);
                out.extend(t.open_upvalues.values().copied());
            }
        }
    }

    pub(crate) fn as_string(&self) -> Option<&LuaString> {
        match self {
            ManagedObject::ShortStr(s) | ManagedObject::LongStr(s) => Some(s),
            _ => None,
        }
    }
}
