//! Cairn - a source-based package manager.

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{Context, InstallArgs, UninstallArgs, UninstallUnusedArgs};

#[derive(Parser)]
#[command(name = "cairn")]
#[command(version, about = "A source-based package manager", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalOptions {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Root of the system to operate on
    #[arg(long, env = "CAIRN_ROOT", default_value = "/", global = true)]
    root: PathBuf,

    /// Path to cairn.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of parallel fetch jobs
    #[arg(short, long, global = true)]
    jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and install packages or @sets
    Install(InstallArgs),

    /// Remove installed packages
    Uninstall(UninstallArgs),

    /// Remove installed packages the world does not need
    UninstallUnused(UninstallUnusedArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let color = !cli.global.no_color;
    if !color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    cairn_diagnostics::setup(color);

    if !cli.global.quiet {
        init_logging(cli.global.verbose);
    }

    let ctx = Context::load(
        cli.global.root,
        cli.global.config.as_deref(),
        cli.global.jobs,
        cli.global.quiet,
    )?;

    match cli.command {
        Commands::Install(args) => commands::install(&ctx, args).await?,
        Commands::Uninstall(args) => commands::uninstall(&ctx, args).await?,
        Commands::UninstallUnused(args) => commands::uninstall_unused(&ctx, args).await?,
    }

    Ok(())
}
