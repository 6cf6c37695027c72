//! logroll: size- and day-bounded rotating log files.
//!
//! # Usage
//!
//! ```text
//! some-service 2>&1 | logroll write [--path <file>] [--max-size-mb N] [--tee]
//! logroll ls [--json]
//! logroll cat [YYYYMMDD]
//! logroll tail [--lines N]
//! logroll prune [--json]
//! logroll config [--save]
//! ```
//!
//! Every command reads `~/.logroll/config.yaml` (or `--config`) and applies
//! the policy flags on top of it.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    cat::CatArgs, config::ConfigArgs, ls::LsArgs, prune::PruneArgs, tail::TailArgs,
    write::WriteArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "logroll",
    version,
    about = "Write stdin to a rotating log file and manage its backups",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append stdin lines to the active log file, rotating as needed.
    Write(WriteArgs),

    /// List the active file and its backups.
    Ls(LsArgs),

    /// Print the active file, or every backup of one day.
    Cat(CatArgs),

    /// Print the last lines of the active file.
    Tail(TailArgs),

    /// Run one retention pass now.
    Prune(PruneArgs),

    /// Show (or save) the effective rotation policy.
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Write(args) => args.run(),
        Commands::Ls(args) => args.run(),
        Commands::Cat(args) => args.run(),
        Commands::Tail(args) => args.run(),
        Commands::Prune(args) => args.run(),
        Commands::Config(args) => args.run(),
    }
}

/// Diagnostics go to stderr so they never mix with piped log data.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
