mod command;
mod config;
mod trace;

use std::env;
use std::panic;

use anyhow::Result;
use clap::Parser;
use log::info;

use command::Command;
use config::ConfigLoad;

/// A thin inspection CLI over the route-driver surface. Ground:
/// `kvcli::Args`'s shape, trimmed of the REPL/session machinery this tool
/// has no use for -- every invocation runs exactly one subcommand and exits.
#[derive(Debug, Parser)]
#[command(version, author, about = "Inspect and poke at ringstore containers")]
struct Args {
    /// Configuration file path.
    #[clap(short = 'c', long = "config", default_value = "ringstorectl.json")]
    config: String,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    cmd: Command,
}

fn main() -> Result<()> {
    setup_panic_hooks();

    ctrlc::set_handler(|| {
        eprintln!("interrupted");
        std::process::exit(130);
    })
    .expect("error setting Ctrl-C handler");

    let args = Args::parse();

    let cfg = ConfigLoad::new(&args.config).unwrap_or_default();
    let log_dir = cfg.log_dir.clone().unwrap_or_else(|| {
        format!("{}/.ringstorectl", env::var("HOME").unwrap_or_else(|_| ".".to_string()))
    });
    let log_level = cfg.log_level.clone().unwrap_or_else(|| args.log_level.clone());
    let _guards = trace::init_logging(&log_dir, &log_level)?;

    info!("ringstorectl starting: {args:?}");
    command::run(args.cmd)
}

fn setup_panic_hooks() {
    let meta = human_panic::Metadata {
        version: env!("CARGO_PKG_VERSION").into(),
        name: env!("CARGO_PKG_NAME").into(),
        authors: env!("CARGO_PKG_AUTHORS").replace(':', ", ").into(),
        homepage: env!("CARGO_PKG_HOMEPAGE").into(),
    };

    let default_hook = panic::take_hook();
    if env::var("RUST_BACKTRACE").is_err() {
        panic::set_hook(Box::new(move |info: &panic::PanicInfo| {
            default_hook(info);
            let file_path = human_panic::handle_dump(&meta, info);
            human_panic::print_msg(file_path, &meta).expect("human-panic: printing error message to console failed");
        }));
    }
}
