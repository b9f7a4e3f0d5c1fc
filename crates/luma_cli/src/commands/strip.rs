use std::fs::File;
use std::io::BufWriter;

use tracing::info;

use super::{EXIT_USAGE, expect_paths, load_chunk};
use crate::args::CliArgs;

pub(crate) fn run(args: &CliArgs) -> i32 {
    if let Err(code) = expect_paths(args, 2, "<in> <out>") {
        return code;
    }
    let (input, output) = (args.positional[0].as_str(), args.positional[1].as_str());
    let loaded = match load_chunk(input) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let file = match File::create(output) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Write failed: {output}: {e}");
            return EXIT_USAGE;
        }
    };
    if let Err(e) = luma_runtime::dump(&loaded.rt, loaded.main, BufWriter::new(file), true) {
        eprintln!("Write failed: {output}: {e}");
        return EXIT_USAGE;
    }
    info!(input, output, "stripped chunk");
    0
}
