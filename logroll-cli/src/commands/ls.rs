//! `logroll ls`: the active file and its backups.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use logroll_core::{FsProbe, OsFs, RotationConfig};
use logroll_writer::{retention::list_backups, BackupRecord};

use super::PolicyArgs;

/// Arguments for `logroll ls`.
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl LsArgs {
    pub fn run(self) -> Result<()> {
        let config = self.policy.resolve()?;
        let listing = build_listing(&config)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&listing).context("failed to serialize listing")?
            );
            return Ok(());
        }
        print_table(&config, listing);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Listing {
    active: Option<ActiveJson>,
    backups: Vec<BackupRecord>,
}

#[derive(Debug, Serialize)]
struct ActiveJson {
    path: String,
    len: u64,
    modified: DateTime<Utc>,
}

#[derive(Tabled)]
struct LsTableRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "modified")]
    modified: String,
    #[tabled(rename = "compressed")]
    compressed: String,
}

fn build_listing(config: &RotationConfig) -> Result<Listing> {
    let active = match OsFs.stat(&config.path) {
        Ok(stat) if !stat.is_dir => Some(ActiveJson {
            path: config.path.display().to_string(),
            len: stat.len,
            modified: stat.modified,
        }),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("failed to stat {}", config.path.display()))
        }
    };
    let backups = list_backups(config, &OsFs)
        .with_context(|| format!("failed to list {}", config.dir().display()))?;
    Ok(Listing { active, backups })
}

fn print_table(config: &RotationConfig, listing: Listing) {
    println!(
        "{} | max {} | keep {} | {} days | {}",
        config.path.display().to_string().bold(),
        human_size(config.max_size_bytes),
        limit_label(config.max_count as u64),
        limit_label(u64::from(config.max_age_days)),
        config.compression,
    );

    let mut rows = Vec::with_capacity(listing.backups.len() + 1);
    if let Some(active) = &listing.active {
        rows.push(LsTableRow {
            file: format!("{} {}", file_name(&config.path), "(active)".green()),
            size: human_size(active.len),
            modified: format_time(active.modified),
            compressed: "-".to_string(),
        });
    }
    for backup in &listing.backups {
        rows.push(LsTableRow {
            file: file_name(&backup.path),
            size: human_size(backup.len),
            modified: format_time(backup.modified),
            compressed: if backup.is_compressed() {
                backup.compression.to_string().yellow().to_string()
            } else {
                "no".bright_black().to_string()
            },
        });
    }

    if rows.is_empty() {
        println!("No log files yet.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn limit_label(limit: u64) -> String {
    if limit == 0 {
        "all".to_string()
    } else {
        limit.to_string()
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_picks_binary_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(100 * 1024 * 1024), "100.0 MiB");
    }

    #[test]
    fn zero_limit_means_all() {
        assert_eq!(limit_label(0), "all");
        assert_eq!(limit_label(7), "7");
    }
}
