//! `logroll cat`: print the active file or one day's backups, decompressed.

use std::io::Write as _;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Args;

use logroll_core::{OsFs, RotationConfig};
use logroll_writer::compress::copy_decoded;
use logroll_writer::namer::DAY_FORMAT;
use logroll_writer::{retention::list_backups, BackupRecord};

use super::PolicyArgs;

/// Arguments for `logroll cat`.
#[derive(Args, Debug)]
pub struct CatArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Day to print, as YYYYMMDD. Omit for the active file.
    pub day: Option<String>,
}

impl CatArgs {
    pub fn run(self) -> Result<()> {
        let config = self.policy.resolve()?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        let Some(day) = self.day.as_deref() else {
            if !config.path.exists() {
                bail!("log file not found: {}", config.path.display());
            }
            copy_decoded(&config.path, &mut out)?;
            return out.flush().context("failed to flush stdout");
        };

        let day = NaiveDate::parse_from_str(day, DAY_FORMAT)
            .with_context(|| format!("'{day}' is not a YYYYMMDD date"))?;
        let backups = backups_for_day(&config, day)?;
        if backups.is_empty() {
            bail!("no backups for {}", day.format(DAY_FORMAT));
        }
        for backup in backups {
            copy_decoded(&backup.path, &mut out)?;
        }
        out.flush().context("failed to flush stdout")
    }
}

/// Backups holding `day`'s content, in rotation order. A plain file shadows
/// its compressed twin.
fn backups_for_day(config: &RotationConfig, day: NaiveDate) -> Result<Vec<BackupRecord>> {
    let mut backups: Vec<BackupRecord> = list_backups(config, &OsFs)
        .with_context(|| format!("failed to list {}", config.dir().display()))?
        .into_iter()
        .filter(|b| b.day == day)
        .collect();
    backups.sort_by_key(|b| (b.sequence, b.is_compressed()));
    backups.dedup_by_key(|b| b.sequence);
    Ok(backups)
}
