//! Closures, upvalue cells, to-be-closed variables and function templates.

mod closure;
mod proto;
mod tbc;
mod upvalue;

pub use closure::{NativeClosure, ScriptClosure};
pub use proto::{
    ABS_LINE_INFO, AbsLineInfo, LIM_LINE_DIFF, LineInfoBuilder, LocVar, MAX_INSTR_WITHOUT_ABS,
    Proto, UpvalDesc,
};
pub use tbc::{CloseDispatch, CloseStatus, MAX_DELTA, TbcList};
pub use upvalue::{UpVal, UpvalState};
