use std::io::Write;

use luma_runtime::chunk::{self, chunk_name};
use luma_runtime::{ObjectId, Proto};
use serde_json::json;

use super::{EXIT_USAGE, Loaded, constant_json, expect_paths, load_chunk, render_constant, string_text};
use crate::args::CliArgs;

pub(crate) fn run(args: &CliArgs) -> i32 {
    if let Err(code) = expect_paths(args, 1, "<chunk>") {
        return code;
    }
    let path = args.positional[0].as_str();
    let loaded = match load_chunk(path) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let lines = if args.json_out {
        json_lines(&loaded)
    } else {
        text_lines(path, &loaded)
    };
    let mut out = std::io::stdout().lock();
    for line in lines {
        if let Err(e) = writeln!(out, "{line}") {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return 0;
            }
            eprintln!("stdout error: {e}");
            return EXIT_USAGE;
        }
    }
    0
}

fn source_label(loaded: &Loaded, p: &Proto) -> String {
    string_text(&loaded.rt, p.source)
        .map(|s| chunk_name(&s))
        .unwrap_or_else(|| "?".to_string())
}

fn text_lines(path: &str, loaded: &Loaded) -> Vec<String> {
    let b = &loaded.bytes;
    let templates = loaded.templates();
    let mut out = vec![format!(
        "chunk {path}: version {}.{}, format {}, sizes {}/{}/{}, {} bytes, {} templates",
        chunk::VERSION >> 4,
        chunk::VERSION & 0x0f,
        b[5],
        b[12],
        b[13],
        b[14],
        b.len(),
        templates.len()
    )];
    for (depth, id) in templates {
        describe(loaded, depth, id, &mut out);
    }
    out
}

fn describe(loaded: &Loaded, depth: usize, id: ObjectId, out: &mut Vec<String>) {
    let rt = &loaded.rt;
    let p = rt.proto(id);
    let pad = "  ".repeat(depth);
    let kind = if depth == 0 { "main" } else { "function" };
    out.push(format!(
        "{pad}{kind} <{}:{},{}> ({} instructions, {} constants, {} upvalues, {} nested)",
        source_label(loaded, p),
        p.line_defined,
        p.last_line_defined,
        p.code.len(),
        p.constants.len(),
        p.upvalues.len(),
        p.protos.len()
    ));
    out.push(format!(
        "{pad}  params {}{}, stack {}, lines {} ({} absolute), locals {}",
        p.num_params,
        if p.is_vararg { "+" } else { "" },
        p.max_stack_size,
        p.line_info.len(),
        p.abs_line_info.len(),
        p.loc_vars.len()
    ));
    for (i, &k) in p.constants.iter().enumerate() {
        out.push(format!("{pad}  k[{i}] {}", render_constant(rt, k)));
    }
    for (i, uv) in p.upvalues.iter().enumerate() {
        out.push(format!(
            "{pad}  upvalue[{i}] {} {} {} {}",
            string_text(rt, uv.name).unwrap_or_else(|| "-".to_string()),
            uv.in_stack as u8,
            uv.index,
            uv.kind
        ));
    }
    for lv in &p.loc_vars {
        out.push(format!(
            "{pad}  local {} {}..{}",
            string_text(rt, lv.name).unwrap_or_else(|| "-".to_string()),
            lv.start_pc,
            lv.end_pc
        ));
    }
}

fn json_lines(loaded: &Loaded) -> Vec<String> {
    let rt = &loaded.rt;
    loaded
        .templates()
        .into_iter()
        .map(|(depth, id)| {
            let p = rt.proto(id);
            let obj = json!({
                "depth": depth,
                "source": string_text(rt, p.source),
                "line_defined": p.line_defined,
                "last_line_defined": p.last_line_defined,
                "params": p.num_params,
                "vararg": p.is_vararg,
                "max_stack": p.max_stack_size,
                "code": p.code.len(),
                "constants": p.constants.iter().map(|&k| constant_json(rt, k)).collect::<Vec<_>>(),
                "upvalues": p.upvalues.iter().map(|u| json!({
                    "name": string_text(rt, u.name),
                    "in_stack": u.in_stack,
                    "index": u.index,
                    "kind": u.kind,
                })).collect::<Vec<_>>(),
                "nested": p.protos.len(),
                "line_info": p.line_info.len(),
                "abs_line_info": p.abs_line_info.len(),
                "locals": p.loc_vars.iter().map(|l| json!({
                    "name": string_text(rt, l.name),
                    "start_pc": l.start_pc,
                    "end_pc": l.end_pc,
                })).collect::<Vec<_>>(),
            });
            obj.to_string()
        })
        .collect()
}
