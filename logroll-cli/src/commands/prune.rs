//! `logroll prune`: one retention pass, on demand.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use logroll_core::{OsFs, SystemClock};
use logroll_writer::{compressor_for, run_pass};

use super::PolicyArgs;

/// Arguments for `logroll prune`.
#[derive(Args, Debug)]
pub struct PruneArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PruneJson {
    removed: Vec<String>,
    compressed: Vec<String>,
    errors: Vec<String>,
}

impl PruneArgs {
    pub fn run(self) -> Result<()> {
        let config = self.policy.resolve()?;
        let compressor = compressor_for(&config);
        let report = run_pass(&config, &SystemClock, &OsFs, compressor.as_deref())
            .with_context(|| format!("retention pass over {} failed", config.dir().display()))?;

        if self.json {
            let payload = PruneJson {
                removed: report.removed.iter().map(|p| p.display().to_string()).collect(),
                compressed: report
                    .compressed
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
                errors: report.errors.iter().map(|e| e.to_string()).collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize report")?
            );
        } else {
            for path in &report.removed {
                println!("{} {}", "removed".red().bold(), path.display());
            }
            for path in &report.compressed {
                println!("{} {}", "compressed".yellow().bold(), path.display());
            }
            for err in &report.errors {
                println!("{} {err}", "failed".magenta().bold());
            }
            if report.removed.is_empty() && report.compressed.is_empty() && report.is_clean() {
                println!("Nothing to prune.");
            }
        }

        if let Some(err) = report.last_error() {
            anyhow::bail!("{} of the pass's operations failed; last: {err}", report.errors.len());
        }
        Ok(())
    }
}
