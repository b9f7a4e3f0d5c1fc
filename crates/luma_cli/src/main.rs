use tracing_subscriber::EnvFilter;

mod args;
mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_logging() {
    let filter = EnvFilter::try_from_env("LUMA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();
    let args = match args::parse_args(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let code = match args.cmd.as_str() {
        "inspect" => commands::inspect::run(&args),
        "strip" => commands::strip::run(&args),
        "verify" => commands::verify::run(&args),
        "help" => {
            println!("{}", args::usage());
            0
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            eprintln!("{}", args::usage());
            2
        }
    };
    std::process::exit(code);
}
