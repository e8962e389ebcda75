//! Watch command implementation

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::{load_context, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::ConsoleProgress;
use crate::build::BuildPipeline;
use crate::config::CliOverrides;
use crate::watch::{DebouncePolicy, WatchSession};

/// Run the watch command
pub fn run_watch(config_path: Option<&Path>, overrides: &CliOverrides, verbose: bool) -> ExitCode {
    let context = match load_context(config_path, overrides, verbose) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    let progress = Arc::new(ConsoleProgress::new().with_verbose(verbose).with_timestamps(true));
    let pipeline = BuildPipeline::new(context).with_progress(progress);

    let session = match WatchSession::new(pipeline) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("Starting watch mode...");
    match session.policy() {
        DebouncePolicy::Debounced(window) => println!("Debounce: {}ms", window.as_millis()),
        DebouncePolicy::EveryEvent => println!("Debounce: off (rebuild on every change)"),
    }
    for group in session.groups() {
        println!("  {} -> {} bundle(s)", group.name, group.bundles.len());
    }
    println!("Press Ctrl+C to stop");
    println!();

    match session.run() {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
