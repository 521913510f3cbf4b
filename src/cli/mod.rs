//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod dev;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::loader::{
    check, default_config, find_config, load_config, merge_cli_overrides, CliOverrides,
    ConfigError,
};
use crate::config::PipelineConfig;

pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// assetpipe - compile, fingerprint and serve front-end assets
#[derive(Parser)]
#[command(name = "assetpipe")]
#[command(about = "Front-end asset pipeline: scripts, styles, templates, sprites and assets")]
#[command(version)]
pub struct Cli {
    /// Path to assetpipe.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build into memory, watch sources and serve with live reload (default)
    Dev {
        /// Dev server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Dev server host
        #[arg(long)]
        host: Option<String>,
    },

    /// Clean production build to disk with fingerprinting and reference rewriting
    Prod,

    /// Pack sprite icons into the sprite image and SCSS partial
    Sprites,

    /// Rewrite references in the on-disk output using the revision manifests
    Process,
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `assetpipe=info`, or `assetpipe=debug`
/// with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "assetpipe=debug" } else { "assetpipe=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Loaded configuration and the directory it is relative to.
pub(crate) struct Project {
    pub config: PipelineConfig,
    pub root: PathBuf,
}

/// Locate and load the configuration, then apply CLI overrides.
///
/// Without a config file the defaults apply relative to the current
/// directory. The root is canonicalized so watcher event paths, which are
/// absolute, match it.
pub(crate) fn load_project(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<Project, ConfigError> {
    let cwd = std::env::current_dir()?;
    let found = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config(),
    };

    let (mut config, root) = match found {
        Some(path) => {
            tracing::debug!("using config: {}", path.display());
            let config = load_config(Some(&path))?;
            let root = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.clone());
            (config, root)
        }
        None => {
            tracing::debug!("no assetpipe.toml found, using defaults");
            (default_config(), cwd)
        }
    };

    merge_cli_overrides(&mut config, overrides);
    let root = std::fs::canonicalize(&root).unwrap_or(root);
    check(&config.validate())?;
    check(&config.validate_output(&root))?;
    Ok(Project { config, root })
}

/// Entry point for the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (port, host) = match &cli.command {
        Some(Commands::Dev { port, host }) => (*port, host.clone()),
        _ => (None, None),
    };
    if port == Some(0) {
        eprintln!("Error: --port must be non-zero");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let overrides = CliOverrides { out: cli.out.clone(), host, port };
    let project = match load_project(cli.config.as_deref(), &overrides) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match cli.command {
        None | Some(Commands::Dev { .. }) => dev::run_dev(project, cli.verbose),
        Some(Commands::Prod) => build::run_prod(project, cli.verbose),
        Some(Commands::Sprites) => build::run_sprites(project, cli.verbose),
        Some(Commands::Process) => build::run_process(project, cli.verbose),
    }
}
