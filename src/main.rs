//! packline - command-line module bundler

use std::process::ExitCode;

use packline::cli;

fn main() -> ExitCode {
    cli::run()
}
