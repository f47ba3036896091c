//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod resolve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use crate::config::OutputMode;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// packline - resolve, transform and emit a module graph
#[derive(Parser)]
#[command(name = "packline")]
#[command(about = "packline - resolve, transform and emit a module graph into an output directory")]
#[command(version)]
pub struct Cli {
    /// Log debug events to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project into its output directory
    Build {
        /// Path to packline.toml (default: nearest one above the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override output layout (bundle or files)
        #[arg(long)]
        mode: Option<OutputMode>,

        /// Worker threads for the transform phase
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        jobs: Option<u16>,

        /// Run every phase except writing and report what would be emitted
        #[arg(long)]
        dry_run: bool,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and inputs without writing anything
    Check {
        /// Path to packline.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Resolve a module reference and show the transform chain it would get
    Resolve {
        /// Reference as written in source (e.g. "~/components/Hello")
        reference: String,

        /// Directory the reference is resolved from (default: source root)
        #[arg(long)]
        from: Option<PathBuf>,

        /// Path to packline.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Create a new project
    Init {
        /// Directory to create the project in (default: current directory)
        path: Option<PathBuf>,

        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Project preset (minimal or component)
        #[arg(long, default_value = "component")]
        preset: String,
    },
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects `debug` and the
/// default is `warn`.
fn init_logging(verbose: bool) {
    let default = if verbose { "packline=debug" } else { "packline=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .without_time()
        .try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_INVALID_ARGS)
            } else {
                ExitCode::from(EXIT_SUCCESS)
            };
        }
    };

    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { config, out, mode, jobs, dry_run, json } => build::run_build(
            config.as_deref(),
            out.as_deref(),
            mode,
            jobs.map(usize::from),
            dry_run,
            json,
        ),
        Commands::Check { config } => build::run_check(config.as_deref()),
        Commands::Resolve { reference, from, config } => {
            resolve::run_resolve(&reference, from.as_deref(), config.as_deref())
        }
        Commands::Init { path, name, preset } => {
            build::run_init(path.as_deref(), name.as_deref(), &preset)
        }
    }
}
