//! Serialize a function template into a precompiled chunk.

use std::io::Write;

use luma_core::{ObjectId, Tag, Value};
use tracing::debug;

use super::{
    CHECK_INT, CHECK_NUM, DATA, FLOAT_SIZE, FORMAT, INSTRUCTION_SIZE, INTEGER_SIZE, SIGNATURE,
    VERSION, varint,
};
use crate::Runtime;
use crate::errors::DumpError;
use crate::func::Proto;

struct DumpState<'a, W: Write> {
    rt: &'a Runtime,
    out: W,
    strip: bool,
    written: usize,
    /// First write failure. Once set, every later write is skipped.
    status: Option<std::io::Error>,
    scratch: Vec<u8>,
}

impl<W: Write> DumpState<'_, W> {
    fn block(&mut self, bytes: &[u8]) {
        if self.status.is_some() || bytes.is_empty() {
            return;
        }
        match self.out.write_all(bytes) {
            Ok(()) => self.written += bytes.len(),
            Err(e) => self.status = Some(e),
        }
    }

    fn byte(&mut self, b: u8) {
        self.block(&[b]);
    }

    fn size(&mut self, x: usize) {
        let mut buf = std::mem::take(&mut self.scratch);
        buf.clear();
        varint::encode(x as u64, &mut buf);
        self.block(&buf);
        self.scratch = buf;
    }

    fn integer(&mut self, i: i64) {
        self.block(&i.to_ne_bytes());
    }

    fn number(&mut self, f: f64) {
        self.block(&f.to_ne_bytes());
    }

    fn string(&mut self, s: Option<ObjectId>) {
        match s {
            None => self.size(0),
            Some(id) => {
                let rt = self.rt;
                let bytes = rt.string_bytes(rt.value_of(id));
                self.size(bytes.len() + 1);
                self.block(bytes);
            }
        }
    }

    fn header(&mut self) {
        self.block(SIGNATURE);
        self.byte(VERSION);
        self.byte(FORMAT);
        self.block(DATA);
        self.byte(INSTRUCTION_SIZE);
        self.byte(INTEGER_SIZE);
        self.byte(FLOAT_SIZE);
        self.integer(CHECK_INT);
        self.number(CHECK_NUM);
    }

    fn code(&mut self, f: &Proto) {
        self.size(f.code.len());
        for &ins in &f.code {
            self.block(&ins.to_ne_bytes());
        }
    }

    fn constant(&mut self, k: Value) {
        self.byte(k.tag().type_tag());
        match k.tag() {
            Tag::FLOAT => self.number(k.as_float()),
            Tag::INT => self.integer(k.as_integer()),
            Tag::SHORT_STR | Tag::LONG_STR => self.string(Some(k.as_object())),
            tag => debug_assert!(
                tag == Tag::NIL || tag == Tag::FALSE || tag == Tag::TRUE,
                "constant of kind {tag}"
            ),
        }
    }

    fn upvalues(&mut self, f: &Proto) {
        self.size(f.upvalues.len());
        for uv in &f.upvalues {
            self.byte(uv.in_stack as u8);
            self.byte(uv.index);
            self.byte(uv.kind);
        }
    }

    fn debug(&mut self, f: &Proto) {
        if self.strip {
            for _ in 0..4 {
                self.size(0);
            }
            return;
        }
        self.size(f.line_info.len());
        let deltas: Vec<u8> = f.line_info.iter().map(|&d| d as u8).collect();
        self.block(&deltas);
        self.size(f.abs_line_info.len());
        for a in &f.abs_line_info {
            self.size(a.pc as usize);
            self.size(a.line as usize);
        }
        self.size(f.loc_vars.len());
        for lv in &f.loc_vars {
            self.string(lv.name);
            self.size(lv.start_pc as usize);
            self.size(lv.end_pc as usize);
        }
        self.size(f.upvalues.len());
        for uv in &f.upvalues {
            self.string(uv.name);
        }
    }

    /// One template. Its source is elided when stripping or when it equals
    /// the enclosing template's.
    fn function(&mut self, id: ObjectId, parent_source: Option<ObjectId>) {
        let rt = self.rt;
        let f = rt.proto(id);
        if self.strip || f.source == parent_source {
            self.string(None);
        } else {
            self.string(f.source);
        }
        self.size(f.line_defined as usize);
        self.size(f.last_line_defined as usize);
        self.byte(f.num_params);
        self.byte(f.is_vararg as u8);
        self.byte(f.max_stack_size);
        self.code(f);
        self.size(f.constants.len());
        for &k in &f.constants {
            self.constant(k);
        }
        self.upvalues(f);
        self.size(f.protos.len());
        for &child in &f.protos {
            self.function(child, f.source);
        }
        self.debug(f);
    }
}

/// Write `proto` as a precompiled chunk to `out`. With `strip` set, source
/// names and all debug tables are omitted. The first write error stops all
/// further output and is returned.
pub fn dump<W: Write>(rt: &Runtime, proto: ObjectId, out: W, strip: bool) -> Result<(), DumpError> {
    let mut d = DumpState {
        rt,
        out,
        strip,
        written: 0,
        status: None,
        scratch: Vec::with_capacity(varint::MAX_LEN),
    };
    d.header();
    d.byte(rt.proto(proto).upvalues.len() as u8);
    d.function(proto, None);
    if d.status.is_none() {
        if let Err(e) = d.out.flush() {
            d.status = Some(e);
        }
    }
    match d.status {
        Some(e) => Err(DumpError(e)),
        None => {
            debug!(bytes = d.written, strip, "dumped chunk");
            Ok(())
        }
    }
}

/// `dump` into a fresh buffer.
pub fn dump_to_vec(rt: &Runtime, proto: ObjectId, strip: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writes into a Vec cannot fail.
    let _ = dump(rt, proto, &mut buf, strip);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use crate::chunk::HEADER_LEN;

    struct FailAfter {
        budget: usize,
        calls: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            if buf.len() > self.budget {
                return Err(std::io::Error::other("sink full"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn tiny(rt: &mut Runtime) -> ObjectId {
        let src = rt.new_string(b"@tiny.lua").unwrap();
        rt.alloc_proto(Proto {
            source: Some(src.as_object()),
            code: vec![0x0100_0046],
            constants: vec![Value::integer(7), Value::TRUE],
            ..Proto::new()
        })
        .unwrap()
    }

    #[test]
    fn header_is_fixed() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let p = tiny(&mut rt);
        let bytes = dump_to_vec(&rt, p, false);
        assert_eq!(&bytes[..4], SIGNATURE);
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], FORMAT);
        assert_eq!(&bytes[6..12], DATA);
        assert_eq!(&bytes[12..15], &[4, 8, 8]);
        assert_eq!(&bytes[15..23], &CHECK_INT.to_ne_bytes());
        assert_eq!(&bytes[23..31], &CHECK_NUM.to_ne_bytes());
        // Main upvalue count, then the source name "@tiny.lua" (9 + 1).
        assert_eq!(bytes[HEADER_LEN], 0);
        assert_eq!(bytes[HEADER_LEN + 1], 0x80 | 10);
    }

    #[test]
    fn stripped_dump_has_no_source() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let p = tiny(&mut rt);
        let full = dump_to_vec(&rt, p, false);
        let stripped = dump_to_vec(&rt, p, true);
        assert_eq!(stripped[HEADER_LEN + 1], 0x80);
        assert_eq!(full.len() - stripped.len(), b"@tiny.lua".len());
    }

    #[test]
    fn first_sink_error_stops_output() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let p = tiny(&mut rt);
        let mut sink = FailAfter { budget: 10, calls: 0 };
        let err = dump(&rt, p, &mut sink, false).unwrap_err();
        assert!(err.to_string().contains("sink full"));
        // Signature and version fit; the format byte fits; DATA does not.
        assert_eq!(sink.calls, 4);
    }
}
