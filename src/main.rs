//! Assetpipe - command-line bundler for scripts and LESS stylesheets

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
