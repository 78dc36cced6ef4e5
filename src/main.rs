#![forbid(unsafe_code)]

//! pastes: netcat-friendly paste service entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("pastes: {e}");
        std::process::exit(1);
    }
}
