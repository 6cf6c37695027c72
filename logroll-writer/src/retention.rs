//! Retention: classify backups by count, age, and compression state, then
//! apply the plan.
//!
//! Every pass lists the directory from scratch. Nothing about backups is
//! cached between passes, so files removed or added by hand are always seen.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use logroll_core::{Clock, Compression, FsProbe, RotationConfig};

use crate::compress::Compressor;
use crate::error::{io_err, RotateError};
use crate::namer::parse_backup_name;

/// One rotated-away file, as found on disk during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub len: u64,
    pub day: NaiveDate,
    pub sequence: u32,
    pub compression: Compression,
}

impl BackupRecord {
    pub fn is_compressed(&self) -> bool {
        self.compression.is_enabled()
    }

    /// File name without any compression suffix. A plain file and its
    /// compressed twin share one logical name.
    pub fn logical_name(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.compression.suffix() {
            Some(suffix) => name.strip_suffix(suffix).unwrap_or(&name).to_string(),
            None => name,
        }
    }
}

/// Output of [`classify`]. `compress` is a subset of `keep`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep: Vec<BackupRecord>,
    pub remove: Vec<BackupRecord>,
    pub compress: Vec<BackupRecord>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.compress.is_empty()
    }
}

/// What one pass actually did.
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub removed: Vec<PathBuf>,
    /// Destination paths of successful compressions.
    pub compressed: Vec<PathBuf>,
    pub errors: Vec<RotateError>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn last_error(&self) -> Option<&RotateError> {
        self.errors.last()
    }
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// All backups of `config.path`, newest first.
///
/// Ordering is by modification time, ties broken by `(day, sequence)` so
/// backups written within the same timestamp tick still sort by rotation order.
/// A missing directory yields an empty list.
pub fn list_backups(
    config: &RotationConfig,
    probe: &dyn FsProbe,
) -> Result<Vec<BackupRecord>, RotateError> {
    let dir = config.dir();
    let (prefix, ext) = config.prefix_and_ext();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(dir, err)),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(parsed) = parse_backup_name(&name, &prefix, &ext) else {
            continue;
        };
        let path = entry.path();
        let stat = match probe.stat(&path) {
            Ok(stat) => stat,
            // Removed between listing and stat.
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&path, err)),
        };
        if stat.is_dir {
            continue;
        }
        backups.push(BackupRecord {
            path,
            modified: stat.modified,
            len: stat.len,
            day: parsed.day,
            sequence: parsed.sequence,
            compression: parsed.compression,
        });
    }

    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| (b.day, b.sequence).cmp(&(a.day, a.sequence)))
            .then_with(|| a.is_compressed().cmp(&b.is_compressed()))
    });
    Ok(backups)
}

/// Scan the directory and classify its backups. Skips the directory listing
/// entirely when the policy has nothing to enforce.
pub fn scan(
    config: &RotationConfig,
    clock: &dyn Clock,
    probe: &dyn FsProbe,
) -> Result<RetentionPlan, RotateError> {
    if config.retention_disabled() {
        return Ok(RetentionPlan::default());
    }
    let backups = list_backups(config, probe)?;
    Ok(classify(backups, config, clock.now()))
}

/// Pure classification of `backups` (newest first) under `config` at `now`.
///
/// Count and age are cumulative: the count limit runs first over logical
/// backups, then the age limit over whatever survived it. Survivors without
/// a compression suffix are queued for compression when it is enabled.
pub fn classify(
    backups: Vec<BackupRecord>,
    config: &RotationConfig,
    now: DateTime<Utc>,
) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    if config.retention_disabled() {
        plan.keep = backups;
        return plan;
    }

    let mut remaining = backups;

    if config.max_count > 0 {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(remaining.len());
        for backup in remaining {
            seen.insert(backup.logical_name());
            if seen.len() > config.max_count {
                plan.remove.push(backup);
            } else {
                kept.push(backup);
            }
        }
        remaining = kept;
    }

    // A cutoff before the representable range expires nothing.
    if let Some(cutoff) = age_cutoff(now, config.max_age_days) {
        let (expired, fresh): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(|b| b.modified < cutoff);
        plan.remove.extend(expired);
        remaining = fresh;
    }

    if config.compression.is_enabled() {
        plan.compress = remaining
            .iter()
            .filter(|b| !b.is_compressed())
            .cloned()
            .collect();
    }
    plan.keep = remaining;
    plan
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Run one full retention pass: scan, remove, compress.
///
/// Per-file failures are recorded in the report and never stop the pass.
/// Only a failure to list the directory is returned as `Err`.
pub fn run_pass(
    config: &RotationConfig,
    clock: &dyn Clock,
    probe: &dyn FsProbe,
    compressor: Option<&dyn Compressor>,
) -> Result<RetentionReport, RotateError> {
    let plan = scan(config, clock, probe)?;
    let mut report = RetentionReport::default();

    for backup in &plan.remove {
        match fs::remove_file(&backup.path) {
            Ok(()) => {
                tracing::debug!(path = %backup.path.display(), "removed expired backup");
                report.removed.push(backup.path.clone());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %backup.path.display(), error = %err, "backup removal failed");
                report.errors.push(io_err(&backup.path, err));
            }
        }
    }

    if let (Some(compressor), Some(suffix)) = (compressor, config.compression.suffix()) {
        for backup in &plan.compress {
            let dst = with_suffix(&backup.path, suffix);
            match compressor.compress(&backup.path, &dst) {
                Ok(()) => {
                    tracing::debug!(path = %dst.display(), "compressed backup");
                    report.compressed.push(dst);
                }
                Err(err) => {
                    tracing::warn!(path = %backup.path.display(), error = %err, "backup compression failed");
                    report.errors.push(err);
                }
            }
        }
    }

    if !plan.is_empty() {
        tracing::info!(
            removed = report.removed.len(),
            compressed = report.compressed.len(),
            failed = report.errors.len(),
            "retention pass finished",
        );
    }
    Ok(report)
}

/// `now - max_age_days`, or `None` when age removal is off or the cutoff
/// falls outside the calendar range.
fn age_cutoff(now: DateTime<Utc>, max_age_days: u32) -> Option<DateTime<Utc>> {
    if max_age_days == 0 {
        return None;
    }
    now.checked_sub_signed(Duration::days(i64::from(max_age_days)))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn record(name: &str, age_days: i64, now: DateTime<Utc>) -> BackupRecord {
        let parsed = parse_backup_name(name, "app", ".log").expect("backup name");
        BackupRecord {
            path: PathBuf::from("/logs").join(name),
            modified: now - Duration::days(age_days),
            len: 10,
            day: parsed.day,
            sequence: parsed.sequence,
            compression: parsed.compression,
        }
    }

    fn policy(max_count: usize, max_age_days: u32, compression: Compression) -> RotationConfig {
        let mut cfg = RotationConfig::for_path("/logs/app.log");
        cfg.max_count = max_count;
        cfg.max_age_days = max_age_days;
        cfg.compression = compression;
        cfg
    }

    fn names(records: &[BackupRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn count_limit_removes_oldest() {
        let backups = vec![
            record("app_20240601.3.log", 0, now()),
            record("app_20240601.2.log", 1, now()),
            record("app_20240601.1.log", 2, now()),
        ];
        let plan = classify(backups, &policy(2, 0, Compression::None), now());
        assert_eq!(names(&plan.remove), ["app_20240601.1.log"]);
        assert_eq!(plan.keep.len(), 2);
        assert!(plan.compress.is_empty());
    }

    #[test]
    fn compressed_pair_counts_once() {
        let backups = vec![
            record("app_20240601.2.log", 0, now()),
            record("app_20240601.1.log.gz", 1, now()),
            record("app_20240601.1.log", 1, now()),
            record("app_20240531.1.log.gz", 3, now()),
        ];
        let plan = classify(backups, &policy(2, 0, Compression::Gzip), now());
        assert_eq!(names(&plan.remove), ["app_20240531.1.log.gz"]);
        assert_eq!(plan.keep.len(), 3);
    }

    #[test]
    fn age_applies_after_count() {
        let backups = vec![
            record("app_20240601.1.log", 0, now()),
            record("app_20240525.1.log", 8, now()),
            record("app_20240520.1.log", 12, now()),
        ];
        let plan = classify(backups, &policy(2, 7, Compression::None), now());
        // .20 goes by count, .25 by age.
        assert_eq!(
            names(&plan.remove),
            ["app_20240520.1.log", "app_20240525.1.log"]
        );
        assert_eq!(names(&plan.keep), ["app_20240601.1.log"]);
    }

    #[rstest]
    #[case(Compression::Gzip)]
    #[case(Compression::Xz)]
    fn survivors_without_suffix_are_compressed(#[case] compression: Compression) {
        let backups = vec![
            record("app_20240601.2.log", 0, now()),
            record("app_20240601.1.log.gz", 1, now()),
        ];
        let plan = classify(backups, &policy(0, 0, compression), now());
        assert_eq!(names(&plan.compress), ["app_20240601.2.log"]);
        assert!(plan.remove.is_empty());
    }

    #[test]
    fn removed_files_are_not_compressed() {
        let backups = vec![
            record("app_20240601.1.log", 0, now()),
            record("app_20240401.1.log", 61, now()),
        ];
        let plan = classify(backups, &policy(0, 31, Compression::Gzip), now());
        assert_eq!(names(&plan.remove), ["app_20240401.1.log"]);
        assert_eq!(names(&plan.compress), ["app_20240601.1.log"]);
    }

    #[test]
    fn disabled_policy_keeps_everything() {
        let backups = vec![record("app_20230101.1.log", 400, now())];
        let plan = classify(backups, &policy(0, 0, Compression::None), now());
        assert!(plan.is_empty());
        assert_eq!(plan.keep.len(), 1);
    }

    #[test]
    fn file_exactly_at_cutoff_is_kept() {
        let backups = vec![record("app_20240525.1.log", 7, now())];
        let plan = classify(backups, &policy(0, 7, Compression::None), now());
        assert!(plan.remove.is_empty());
    }

    #[rstest]
    #[case(200_000_000)]
    #[case(u32::MAX)]
    fn age_beyond_the_calendar_expires_nothing(#[case] max_age_days: u32) {
        let backups = vec![record("app_20000101.1.log", 9000, now())];
        let plan = classify(backups, &policy(0, max_age_days, Compression::None), now());
        assert!(plan.remove.is_empty());
        assert_eq!(plan.keep.len(), 1);
    }
}
