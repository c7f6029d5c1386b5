//! Entrypoint for the cgproxy daemon.

use std::io::{self, Write};
use std::process::ExitCode;

use cgproxyd::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse_lenient(std::env::args_os());
    match cgproxyd::run_daemon(cli.debug) {
        Ok(reason) => reason.exit_code(),
        Err(error) => {
            let _ = writeln!(io::stderr(), "cgproxyd: {error}");
            ExitCode::FAILURE
        }
    }
}
