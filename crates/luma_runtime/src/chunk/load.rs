//! Load a precompiled chunk back into function templates.

use luma_core::{ObjectId, Tag, Value};
use tracing::debug;

use super::varint::{self, DecodeError};
use super::{
    CHECK_INT, CHECK_NUM, DATA, FLOAT_SIZE, FORMAT, INSTRUCTION_SIZE, INTEGER_SIZE, SIGNATURE,
    VERSION,
};
use crate::Runtime;
use crate::errors::{LoadError, RuntimeError, messages};
use crate::func::{AbsLineInfo, LocVar, Proto, UpvalDesc};

/// Name used in load errors for a chunk called `name`.
pub fn chunk_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix('@').or_else(|| name.strip_prefix('=')) {
        rest.to_string()
    } else if name.as_bytes().first() == Some(&SIGNATURE[0]) {
        "binary string".to_string()
    } else {
        name.to_string()
    }
}

struct LoadState<'a> {
    rt: &'a mut Runtime,
    data: &'a [u8],
    off: usize,
    name: String,
    templates: usize,
}

impl<'a> LoadState<'a> {
    fn error(&self, reason: impl Into<String>) -> RuntimeError {
        RuntimeError::Load(LoadError {
            chunk: self.name.clone(),
            reason: reason.into(),
        })
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], RuntimeError> {
        if self.data.len() - self.off < n {
            return Err(self.error(messages::TRUNCATED));
        }
        let data = self.data;
        let start = self.off;
        self.off += n;
        Ok(&data[start..self.off])
    }

    fn byte(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.bytes(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], RuntimeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn unsigned(&mut self, limit: u64) -> Result<u64, RuntimeError> {
        match varint::decode(&self.data[self.off..], limit) {
            Ok((x, n)) => {
                self.off += n;
                Ok(x)
            }
            Err(DecodeError::Truncated) => Err(self.error(messages::TRUNCATED)),
            Err(DecodeError::Overflow) => Err(self.error(messages::INT_OVERFLOW)),
        }
    }

    fn size(&mut self) -> Result<usize, RuntimeError> {
        Ok(self.unsigned(usize::MAX as u64)? as usize)
    }

    /// Counts and small integers, bounded by `i32::MAX`.
    fn int(&mut self) -> Result<u32, RuntimeError> {
        Ok(self.unsigned(i32::MAX as u64)? as u32)
    }

    fn integer(&mut self) -> Result<i64, RuntimeError> {
        Ok(i64::from_ne_bytes(self.array()?))
    }

    fn number(&mut self) -> Result<f64, RuntimeError> {
        Ok(f64::from_ne_bytes(self.array()?))
    }

    /// Optional string. Short ones are interned, long ones created fresh;
    /// either way the result stays rooted until loading ends.
    fn string(&mut self) -> Result<Option<ObjectId>, RuntimeError> {
        let size = self.size()?;
        if size == 0 {
            return Ok(None);
        }
        let bytes = self.bytes(size - 1)?;
        let v = if bytes.len() <= self.rt.config.short_string_max {
            self.rt.intern_short(bytes)?
        } else {
            self.rt.make_long(bytes)?
        };
        self.rt.gc_temp_roots.push(v);
        Ok(Some(v.as_object()))
    }

    fn literal(&mut self, lit: &[u8], reason: &str) -> Result<(), RuntimeError> {
        if self.bytes(lit.len())? != lit {
            return Err(self.error(reason));
        }
        Ok(())
    }

    fn check_size(&mut self, want: u8, what: &str) -> Result<(), RuntimeError> {
        if self.byte()? != want {
            return Err(self.error(format!("{what} size mismatch")));
        }
        Ok(())
    }

    fn header(&mut self) -> Result<(), RuntimeError> {
        // The first byte was checked by the caller.
        self.literal(&SIGNATURE[1..], messages::NOT_A_CHUNK)?;
        if self.byte()? != VERSION {
            return Err(self.error(messages::VERSION_MISMATCH));
        }
        if self.byte()? != FORMAT {
            return Err(self.error(messages::FORMAT_MISMATCH));
        }
        self.literal(DATA, messages::CORRUPTED)?;
        self.check_size(INSTRUCTION_SIZE, "Instruction")?;
        self.check_size(INTEGER_SIZE, "integer")?;
        self.check_size(FLOAT_SIZE, "float")?;
        if self.integer()? != CHECK_INT {
            return Err(self.error(messages::INT_FORMAT));
        }
        if self.number()? != CHECK_NUM {
            return Err(self.error(messages::FLOAT_FORMAT));
        }
        Ok(())
    }

    fn code(&mut self, f: &mut Proto) -> Result<(), RuntimeError> {
        let n = self.int()? as usize;
        let raw = self.bytes(n.saturating_mul(4))?;
        f.code = raw
            .chunks_exact(4)
            .map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Ok(())
    }

    fn constants(&mut self, f: &mut Proto) -> Result<(), RuntimeError> {
        let n = self.int()? as usize;
        f.constants = Vec::with_capacity(n.min(self.data.len()));
        for _ in 0..n {
            let tt = self.byte()?;
            let k = match Tag::from_type_tag(tt) {
                Some(Tag::NIL) => Value::NIL,
                Some(Tag::FALSE) => Value::FALSE,
                Some(Tag::TRUE) => Value::TRUE,
                Some(Tag::FLOAT) => Value::float(self.number()?),
                Some(Tag::INT) => Value::integer(self.integer()?),
                Some(Tag::SHORT_STR) | Some(Tag::LONG_STR) => match self.string()? {
                    Some(id) => self.rt.value_of(id),
                    None => return Err(self.error(messages::BAD_CONSTANT_STRING)),
                },
                _ => return Err(self.error(messages::BAD_CONSTANT_TAG)),
            };
            f.constants.push(k);
        }
        Ok(())
    }

    fn upvalues(&mut self, f: &mut Proto) -> Result<(), RuntimeError> {
        let n = self.int()? as usize;
        f.upvalues = Vec::with_capacity(n.min(self.data.len()));
        for _ in 0..n {
            let [in_stack, index, kind] = self.array()?;
            f.upvalues.push(UpvalDesc {
                name: None,
                in_stack: in_stack != 0,
                index,
                kind,
            });
        }
        Ok(())
    }

    fn protos(&mut self, f: &mut Proto) -> Result<(), RuntimeError> {
        let n = self.int()? as usize;
        f.protos = Vec::with_capacity(n.min(self.data.len()));
        for _ in 0..n {
            let child = self.function(f.source)?;
            f.protos.push(child);
        }
        Ok(())
    }

    fn debug_info(&mut self, f: &mut Proto) -> Result<(), RuntimeError> {
        let n = self.int()? as usize;
        f.line_info = self.bytes(n)?.iter().map(|&b| b as i8).collect();

        let n = self.int()? as usize;
        f.abs_line_info = Vec::with_capacity(n.min(self.data.len()));
        for _ in 0..n {
            let pc = self.int()?;
            let line = self.int()?;
            f.abs_line_info.push(AbsLineInfo { pc, line });
        }

        let n = self.int()? as usize;
        f.loc_vars = Vec::with_capacity(n.min(self.data.len()));
        for _ in 0..n {
            let name = self.string()?;
            let start_pc = self.int()?;
            let end_pc = self.int()?;
            f.loc_vars.push(LocVar { name, start_pc, end_pc });
        }

        // Either every upvalue is named or none is.
        let n = self.int()? as usize;
        if n != 0 && n != f.upvalues.len() {
            return Err(self.error(messages::UPVALUE_COUNT));
        }
        for uv in f.upvalues.iter_mut().take(n) {
            uv.name = self.string()?;
        }
        Ok(())
    }

    /// One template; an elided source name is inherited from the parent.
    fn function(&mut self, parent_source: Option<ObjectId>) -> Result<ObjectId, RuntimeError> {
        let mut f = Proto::new();
        f.source = self.string()?.or(parent_source);
        f.line_defined = self.int()?;
        f.last_line_defined = self.int()?;
        f.num_params = self.byte()?;
        f.is_vararg = self.byte()? != 0;
        f.max_stack_size = self.byte()?;
        self.code(&mut f)?;
        self.constants(&mut f)?;
        self.upvalues(&mut f)?;
        self.protos(&mut f)?;
        self.debug_info(&mut f)?;
        let id = self.rt.alloc_proto(f)?;
        self.rt.gc_temp_roots.push(Value::from_object(Tag::PROTO, id));
        self.templates += 1;
        Ok(id)
    }

    fn chunk(&mut self) -> Result<Value, RuntimeError> {
        self.header()?;
        let nup = self.byte()? as usize;
        let main = self.function(None)?;
        if self.rt.proto(main).upvalues.len() != nup {
            return Err(self.error(messages::UPVALUE_COUNT));
        }
        let cl = self.rt.new_script_closure(nup)?;
        self.rt.gc_temp_roots.push(cl);
        self.rt.set_closure_proto(cl, main);
        self.rt.init_upvalues(cl)?;
        Ok(cl)
    }
}

/// Load the chunk in `data` and return a script closure over its main
/// function, with every upvalue initialised to a fresh closed cell. `name`
/// identifies the chunk in error messages.
pub fn undump(rt: &mut Runtime, data: &[u8], name: &str) -> Result<Value, RuntimeError> {
    let name = chunk_name(name);
    if data.first() != Some(&SIGNATURE[0]) {
        return Err(RuntimeError::Load(LoadError {
            chunk: name,
            reason: messages::NOT_A_CHUNK.to_string(),
        }));
    }
    let roots = rt.gc_temp_roots.len();
    let mut s = LoadState {
        rt,
        data,
        off: 1,
        name,
        templates: 0,
    };
    let result = s.chunk();
    let (templates, consumed) = (s.templates, s.off);
    let rt = s.rt;
    rt.gc_temp_roots.truncate(roots);
    if result.is_ok() {
        debug!(templates, bytes = consumed, "loaded chunk");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    #[test]
    fn chunk_names_drop_their_prefix() {
        assert_eq!(chunk_name("@main.lua"), "main.lua");
        assert_eq!(chunk_name("=stdin"), "stdin");
        assert_eq!(chunk_name("\x1bLua"), "binary string");
        assert_eq!(chunk_name("plain"), "plain");
    }

    #[test]
    fn text_input_is_not_a_chunk() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let err = undump(&mut rt, b"print('hi')", "@x.lua").unwrap_err();
        assert_eq!(err.to_string(), "x.lua: bad binary format (not a binary chunk)");
        assert!(rt.gc_temp_roots.is_empty());
    }
}
