//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod list;
mod watch;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::build::BuildContext;
use crate::config::{
    default_config, find_config, load_config, merge_cli_overrides, project_root, AssetsConfig, CliOverrides,
};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Assetpipe - bundle scripts and LESS stylesheets
#[derive(Parser)]
#[command(name = "assetpipe")]
#[command(about = "Assetpipe - concatenate, compile and minify script and stylesheet bundles")]
#[command(version)]
pub struct Cli {
    /// Path to assets.toml (default: search upward from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (also raises log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build bundles (all of them when none are named)
    Build {
        /// Bundles to build: qualified ids (style:name) or bare names
        bundles: Vec<String>,

        /// Build every script bundle
        #[arg(long)]
        scripts: bool,

        /// Build every stylesheet bundle
        #[arg(long)]
        styles: bool,

        /// Number of bundles built concurrently (default: available cores)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        jobs: Option<u32>,

        /// Show what would be built without reading or writing files
        #[arg(long)]
        dry_run: bool,

        /// Progress output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,

        #[command(flatten)]
        paths: PathArgs,
    },

    /// Build everything, then rebuild bundle groups as their sources change
    Watch {
        /// Debounce window in milliseconds (0 rebuilds on every event)
        #[arg(long)]
        debounce_ms: Option<u32>,

        #[command(flatten)]
        paths: PathArgs,
    },

    /// List configured bundles with their sources and outputs
    List {
        #[command(flatten)]
        paths: PathArgs,
    },
}

/// Directory overrides shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub struct PathArgs {
    /// Override paths.source_root
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Override paths.script_out
    #[arg(long)]
    pub script_out: Option<PathBuf>,

    /// Override paths.style_out
    #[arg(long)]
    pub style_out: Option<PathBuf>,

    /// Override paths.vendor_dir
    #[arg(long)]
    pub vendor_dir: Option<PathBuf>,
}

impl PathArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            source_root: self.source_root.clone(),
            script_out: self.script_out.clone(),
            style_out: self.style_out.clone(),
            vendor_dir: self.vendor_dir.clone(),
            debounce_ms: None,
        }
    }
}

/// Progress output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable status lines
    Console,
    /// One JSON object per line
    Json,
}

pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(EXIT_INVALID_ARGS) } else { ExitCode::from(EXIT_SUCCESS) };
        }
    };

    init_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Build { bundles, scripts, styles, jobs, dry_run, format, paths } => build::run_build(
            config_path,
            &paths.overrides(),
            &bundles,
            build::KindFilter { scripts, styles },
            jobs.map(|j| j as usize),
            dry_run,
            format,
            cli.verbose,
        ),
        Commands::Watch { debounce_ms, paths } => {
            let overrides = CliOverrides { debounce_ms, ..paths.overrides() };
            watch::run_watch(config_path, &overrides, cli.verbose)
        }
        Commands::List { paths } => list::run_list(config_path, &paths.overrides()),
    }
}

/// Install the tracing subscriber: `RUST_LOG` wins, else `warn`, or
/// `assetpipe=debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "warn,assetpipe=debug" } else { "warn" })
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Load configuration, apply overrides and build the context.
///
/// Errors are printed; the caller only needs the exit code.
pub(crate) fn load_context(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    verbose: bool,
) -> Result<BuildContext, ExitCode> {
    let (mut config, root) = load(config_path, verbose)?;
    merge_cli_overrides(&mut config, overrides);

    BuildContext::new(config, root).map(|ctx| ctx.with_verbose(verbose)).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_ERROR)
    })
}

fn load(config_path: Option<&Path>, verbose: bool) -> Result<(AssetsConfig, PathBuf), ExitCode> {
    let config_path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(path) => {
            if verbose {
                eprintln!("Using config: {}", path.display());
            }
            let config = load_config(Some(&path)).map_err(|e| {
                eprintln!("Error loading config: {}", e);
                ExitCode::from(EXIT_ERROR)
            })?;
            let root = match project_root(&path) {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => std::env::current_dir().unwrap_or_default(),
            };
            Ok((config, root))
        }
        None => {
            if verbose {
                eprintln!("No assets.toml found, using built-in bundles");
            }
            Ok((default_config(), std::env::current_dir().unwrap_or_default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_args() {
        let cli = Cli::try_parse_from([
            "assetpipe",
            "build",
            "scielo-article",
            "style:scielo-bundle",
            "--jobs",
            "2",
            "--format",
            "json",
            "--style-out",
            "dist/css",
        ])
        .unwrap();
        match cli.command {
            Commands::Build { bundles, jobs, format, paths, dry_run, .. } => {
                assert_eq!(bundles, vec!["scielo-article", "style:scielo-bundle"]);
                assert_eq!(jobs, Some(2));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(paths.style_out, Some(PathBuf::from("dist/css")));
                assert!(!dry_run);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["assetpipe", "list", "-v", "--config", "x/assets.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x/assets.toml")));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        assert!(Cli::try_parse_from(["assetpipe", "build", "--jobs", "0"]).is_err());
    }

    #[test]
    fn test_watch_debounce() {
        let cli = Cli::try_parse_from(["assetpipe", "watch", "--debounce-ms", "0"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch { debounce_ms: Some(0), .. }));
    }

    #[test]
    fn test_path_args_to_overrides() {
        let args = PathArgs { vendor_dir: Some(PathBuf::from("vendor")), ..Default::default() };
        let overrides = args.overrides();
        assert_eq!(overrides.vendor_dir, Some(PathBuf::from("vendor")));
        assert!(overrides.source_root.is_none());
        assert!(overrides.debounce_ms.is_none());
    }
}
