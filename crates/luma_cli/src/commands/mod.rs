use luma_runtime::{ObjectId, Runtime, RuntimeConfig, RuntimeError, Value};

pub(crate) mod inspect;
pub(crate) mod strip;
pub(crate) mod verify;

/// Exit code for a chunk that failed to load or verify.
pub(crate) const EXIT_CHECK: i32 = 1;
/// Exit code for usage and I/O errors.
pub(crate) const EXIT_USAGE: i32 = 2;

/// A runtime with a chunk loaded from `path`; the main closure sits on the
/// stack.
pub(crate) struct Loaded {
    pub rt: Runtime,
    pub bytes: Vec<u8>,
    pub main: ObjectId,
}

impl Loaded {
    /// Every template, depth first, with its nesting depth.
    pub fn templates(&self) -> Vec<(usize, ObjectId)> {
        let mut out = Vec::new();
        let mut pending = vec![(0, self.main)];
        while let Some((depth, id)) = pending.pop() {
            out.push((depth, id));
            let children = &self.rt.proto(id).protos;
            pending.extend(children.iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }
}

pub(crate) fn load_chunk(path: &str) -> Result<Loaded, i32> {
    let bytes = std::fs::read(path).map_err(|e| {
        eprintln!("Read failed: {path}: {e}");
        EXIT_USAGE
    })?;
    let mut rt = Runtime::new(RuntimeConfig::from_env()).map_err(|e| {
        eprintln!("Runtime setup failed: {e}");
        EXIT_USAGE
    })?;
    let cl = match luma_runtime::undump(&mut rt, &bytes, &format!("@{path}")) {
        Ok(cl) => cl,
        Err(RuntimeError::Load(e)) => {
            eprintln!("{e}");
            return Err(EXIT_CHECK);
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            return Err(EXIT_CHECK);
        }
    };
    rt.push(cl);
    let Some(main) = rt.script_closure(cl).proto() else {
        eprintln!("{path}: loaded closure has no function template");
        return Err(EXIT_CHECK);
    };
    Ok(Loaded { rt, bytes, main })
}

pub(crate) fn expect_paths(args: &crate::args::CliArgs, n: usize, what: &str) -> Result<(), i32> {
    if args.positional.len() != n {
        eprintln!("Missing {what}");
        return Err(EXIT_USAGE);
    }
    Ok(())
}

/// Printable form of a string payload.
pub(crate) fn escape_visible(bytes: &[u8]) -> String {
    let mut out = String::new();
    for c in String::from_utf8_lossy(bytes).chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\{}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn string_text(rt: &Runtime, s: Option<ObjectId>) -> Option<String> {
    s.map(|id| rt.lua_string(rt.value_of(id)).to_string_lossy())
}

/// Constant as it would appear in source.
pub(crate) fn render_constant(rt: &Runtime, k: Value) -> String {
    if k.is_strict_nil() {
        "nil".to_string()
    } else if k.is_boolean() {
        k.as_boolean().to_string()
    } else if let Some(i) = k.try_integer() {
        i.to_string()
    } else if let Some(f) = k.try_float() {
        format!("{f:?}")
    } else if k.is_string() {
        format!("\"{}\"", escape_visible(rt.string_bytes(k)))
    } else {
        format!("<{}>", k.type_name())
    }
}

/// Constant as a JSON value. Strings are decoded lossily.
pub(crate) fn constant_json(rt: &Runtime, k: Value) -> serde_json::Value {
    if k.is_boolean() {
        serde_json::Value::Bool(k.as_boolean())
    } else if let Some(i) = k.try_integer() {
        serde_json::json!(i)
    } else if let Some(f) = k.try_float() {
        serde_json::json!(f)
    } else if k.is_string() {
        serde_json::Value::String(String::from_utf8_lossy(rt.string_bytes(k)).into_owned())
    } else {
        serde_json::Value::Null
    }
}
