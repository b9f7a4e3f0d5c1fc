use luma_runtime::func::{LineInfoBuilder, LocVar, UpvalDesc};
use luma_runtime::{
    ObjectId, Proto, Runtime, RuntimeConfig, RuntimeError, UpvalState, Value, dump, dump_to_vec,
    undump,
};

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig {
        hash_seed: Some(3),
        ..Default::default()
    })
    .unwrap()
}

fn name(rt: &mut Runtime, s: &str) -> Option<ObjectId> {
    let v = rt.new_string(s.as_bytes()).unwrap();
    rt.anchor(v);
    Some(v.as_object())
}

/// main.lua with one child from the same file and one from another.
fn sample(rt: &mut Runtime) -> ObjectId {
    let main_src = name(rt, "@main.lua");
    let other_src = name(rt, "@other.lua");

    let mut same = Proto {
        source: main_src,
        line_defined: 3,
        last_line_defined: 5,
        num_params: 2,
        max_stack_size: 4,
        code: vec![0x8000_0001, 0x0000_0046],
        constants: vec![Value::float(0.5)],
        loc_vars: vec![LocVar { name: name(rt, "a"), start_pc: 0, end_pc: 2 }],
        upvalues: vec![UpvalDesc { name: name(rt, "x"), in_stack: true, index: 1, kind: 0 }],
        ..Proto::new()
    };
    let mut lines = LineInfoBuilder::new(3);
    lines.push(4);
    lines.push(5);
    lines.finish_into(&mut same);
    let same = rt.alloc_proto(same).unwrap();

    let foreign = rt
        .alloc_proto(Proto {
            source: other_src,
            line_defined: 1,
            last_line_defined: 1,
            is_vararg: true,
            max_stack_size: 2,
            code: vec![0x0000_0046],
            ..Proto::new()
        })
        .unwrap();

    let long = rt.new_string(&[b'L'; 70]).unwrap();
    let short = rt.new_string(b"key").unwrap();
    let mut main = Proto {
        source: main_src,
        line_defined: 0,
        last_line_defined: 0,
        is_vararg: true,
        max_stack_size: 8,
        code: (0..200).map(|i| i * 3).collect(),
        constants: vec![
            Value::NIL,
            Value::FALSE,
            Value::TRUE,
            Value::integer(-42),
            Value::float(2.25),
            short,
            long,
        ],
        protos: vec![same, foreign],
        upvalues: vec![UpvalDesc { name: name(rt, "_ENV"), in_stack: true, index: 0, kind: 0 }],
        loc_vars: vec![LocVar { name: name(rt, "t"), start_pc: 1, end_pc: 200 }],
        ..Proto::new()
    };
    let mut lines = LineInfoBuilder::new(0);
    for pc in 0..200u32 {
        lines.push(if pc == 150 { 900 } else { 1 + pc / 4 });
    }
    lines.finish_into(&mut main);
    let id = rt.alloc_proto(main).unwrap();
    rt.anchor(Value::from_object(luma_runtime::Tag::PROTO, id));
    id
}

fn text(rt: &Runtime, s: Option<ObjectId>) -> Option<String> {
    s.map(|id| rt.lua_string(rt.value_of(id)).to_string_lossy())
}

fn main_proto(rt: &Runtime, cl: Value) -> ObjectId {
    rt.script_closure(cl).proto().unwrap()
}

#[test]
fn round_trip_preserves_templates() {
    let mut rt = runtime();
    let original = sample(&mut rt);
    let bytes = dump_to_vec(&rt, original, false);

    let cl = undump(&mut rt, &bytes, "@main.lua").unwrap();
    rt.push(cl);
    let loaded = main_proto(&rt, cl);
    let (a, b) = (rt.proto(original), rt.proto(loaded));

    assert_eq!(a.code, b.code);
    assert_eq!(a.is_vararg, b.is_vararg);
    assert_eq!(a.max_stack_size, b.max_stack_size);
    assert_eq!(a.line_info, b.line_info);
    assert_eq!(a.abs_line_info, b.abs_line_info);
    assert!(!b.abs_line_info.is_empty());
    assert_eq!(b.line_at(150), Some(900));
    assert_eq!(a.constants.len(), b.constants.len());
    for (x, y) in a.constants.iter().zip(&b.constants) {
        assert!(rt.raw_equals(*x, *y), "{x:?} != {y:?}");
        assert_eq!(x.tag(), y.tag());
    }
    // Short string constants come back as the very same interned object.
    assert_eq!(a.constants[5], b.constants[5]);
    assert_eq!(text(&rt, b.source).as_deref(), Some("@main.lua"));
    assert_eq!(text(&rt, b.upvalues[0].name).as_deref(), Some("_ENV"));
    assert_eq!(text(&rt, b.loc_vars[0].name).as_deref(), Some("t"));
    assert_eq!(b.protos.len(), 2);

    let same = rt.proto(b.protos[0]);
    assert_eq!(same.num_params, 2);
    assert_eq!((same.line_defined, same.last_line_defined), (3, 5));
    assert_eq!(text(&rt, same.source).as_deref(), Some("@main.lua"));
    assert!(same.upvalues[0].in_stack);
    assert_eq!(same.upvalues[0].index, 1);
    assert_eq!(same.line_at(1), Some(5));
    let foreign = rt.proto(b.protos[1]);
    assert_eq!(text(&rt, foreign.source).as_deref(), Some("@other.lua"));

    // Loading then dumping again reproduces the same bytes.
    assert_eq!(dump_to_vec(&rt, loaded, false), bytes);
}

#[test]
fn loaded_main_closure_has_closed_nil_upvalues() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let bytes = dump_to_vec(&rt, p, false);
    let cl = undump(&mut rt, &bytes, "=main").unwrap();
    let cells = rt.script_closure(cl).upvalues().to_vec();
    assert_eq!(cells.len(), 1);
    let cell = cells[0].unwrap();
    assert_eq!(rt.upvalue_state(cell), UpvalState::Closed(Value::NIL));
}

#[test]
fn stripped_chunks_load_without_debug_info() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let full = dump_to_vec(&rt, p, false);
    let stripped = dump_to_vec(&rt, p, true);
    assert!(stripped.len() < full.len());

    let cl = undump(&mut rt, &stripped, "stripped").unwrap();
    rt.push(cl);
    let loaded = rt.proto(main_proto(&rt, cl));
    assert_eq!(loaded.source, None);
    assert!(loaded.line_info.is_empty());
    assert!(loaded.abs_line_info.is_empty());
    assert!(loaded.loc_vars.is_empty());
    assert_eq!(loaded.upvalues.len(), 1);
    assert_eq!(loaded.upvalues[0].name, None);
    assert_eq!(loaded.line_at(0), None);
    assert_eq!(loaded.code, rt.proto(p).code);
    for &child in &loaded.protos {
        assert_eq!(rt.proto(child).source, None);
    }
}

#[test]
fn children_sharing_the_source_elide_it() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let bytes = dump_to_vec(&rt, p, false);
    let count = |needle: &[u8]| bytes.windows(needle.len()).filter(|w| *w == needle).count();
    assert_eq!(count(b"@main.lua"), 1);
    assert_eq!(count(b"@other.lua"), 1);
}

fn load_err(bytes: &[u8]) -> String {
    let mut rt = runtime();
    match undump(&mut rt, bytes, "@bad.lua") {
        Err(RuntimeError::Load(e)) => {
            assert_eq!(e.chunk, "bad.lua");
            e.reason
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("malformed chunk loaded"),
    }
}

#[test]
fn every_truncation_is_reported() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let bytes = dump_to_vec(&rt, p, false);
    assert_eq!(load_err(&bytes[..0]), "not a binary chunk");
    for cut in 1..bytes.len() {
        assert_eq!(load_err(&bytes[..cut]), "truncated chunk", "cut at {cut}");
    }
}

#[test]
fn header_fields_are_checked() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let good = dump_to_vec(&rt, p, true);
    let corrupt = |at: usize| {
        let mut b = good.clone();
        b[at] ^= 0x01;
        b
    };
    assert_eq!(load_err(&corrupt(1)), "not a binary chunk");
    assert_eq!(load_err(&corrupt(4)), "version mismatch");
    assert_eq!(load_err(&corrupt(5)), "format mismatch");
    assert_eq!(load_err(&corrupt(8)), "corrupted chunk");
    assert_eq!(load_err(&corrupt(12)), "Instruction size mismatch");
    assert_eq!(load_err(&corrupt(13)), "integer size mismatch");
    assert_eq!(load_err(&corrupt(14)), "float size mismatch");
    assert_eq!(load_err(&corrupt(15)), "integer format mismatch");
    assert_eq!(load_err(&corrupt(23)), "float format mismatch");
    // Main upvalue count disagrees with the template.
    assert_eq!(load_err(&corrupt(31)), "upvalue count mismatch");
}

#[test]
fn oversized_integers_are_rejected() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let good = dump_to_vec(&rt, p, true);
    // Header, upvalue count, empty source; then a line number past i32::MAX.
    let mut b = good[..33].to_vec();
    b.extend_from_slice(&[0x08, 0x00, 0x00, 0x00, 0x80]);
    assert_eq!(load_err(&b), "integer overflow");
}

#[test]
fn load_errors_release_temporary_roots() {
    let mut rt = runtime();
    let p = sample(&mut rt);
    let bytes = dump_to_vec(&rt, p, false);
    let objects = rt.heap().object_count();
    assert!(undump(&mut rt, &bytes[..bytes.len() - 1], "cut").is_err());
    rt.full_collection();
    assert_eq!(rt.heap().object_count(), objects);
}

#[test]
fn sink_failures_are_returned() {
    struct Broken;
    impl std::io::Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
    let mut rt = runtime();
    let p = sample(&mut rt);
    let err = dump(&rt, p, Broken, false).unwrap_err();
    assert_eq!(err.0.to_string(), "disk full");
}
