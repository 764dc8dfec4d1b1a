mod app;
mod patch;

use std::process::ExitCode;

use clap::Parser;

use crate::app::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => error.exit(),
    };

    // cilhook info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("cilhook", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    if let Err(message) = patch::check_target(&cli.target) {
        eprintln!("error: {message}");
        eprintln!("Usage: cilhook <TARGET.json> [--script FILE] [--profile FILE] [--runtime-dir DIR] [--dispatcher FILE] [-v]");
        return ExitCode::from(2);
    }

    match patch::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
