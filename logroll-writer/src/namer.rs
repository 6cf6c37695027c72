//! Backup file naming.
//!
//! `app.log` rotates to `app_<YYYYMMDD>.<N>.log`, and to
//! `app_<YYYYMMDD>.<N>.log.gz` / `.xz` once compressed. `N` counts up from 1
//! within a UTC day.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use logroll_core::types::split_file_name;
use logroll_core::{Compression, FsProbe};

pub const DAY_FORMAT: &str = "%Y%m%d";

/// Hands out collision-free backup paths for one active file.
///
/// The in-memory sequence is only a starting point: every candidate is
/// checked on disk (plain and every compressed form) before it is returned,
/// so stale state after a crash never overwrites an existing backup.
#[derive(Debug, Clone)]
pub struct Namer {
    dir: PathBuf,
    prefix: String,
    ext: String,
    day: Option<NaiveDate>,
    sequence: u32,
}

impl Namer {
    pub fn new(active: &Path) -> Self {
        let (prefix, ext) = split_file_name(active);
        let dir = match active.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            dir,
            prefix,
            ext,
            day: None,
            sequence: 0,
        }
    }

    /// Next unused backup path for contents belonging to `day`.
    pub fn backup_name(&mut self, day: NaiveDate, probe: &dyn FsProbe) -> PathBuf {
        if self.day != Some(day) {
            self.day = Some(day);
            self.sequence = 0;
        }
        loop {
            self.sequence += 1;
            let candidate = self
                .dir
                .join(format_backup_name(&self.prefix, day, self.sequence, &self.ext));
            if !is_taken(&candidate, probe) {
                return candidate;
            }
        }
    }

    /// Last sequence handed out for the tracked day.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

fn is_taken(candidate: &Path, probe: &dyn FsProbe) -> bool {
    if probe.exists(candidate) {
        return true;
    }
    Compression::KNOWN_SUFFIXES.iter().any(|suffix| {
        let mut compressed = candidate.as_os_str().to_owned();
        compressed.push(suffix);
        probe.exists(Path::new(&compressed))
    })
}

/// `<prefix>_<YYYYMMDD>.<sequence><ext>`
pub fn format_backup_name(prefix: &str, day: NaiveDate, sequence: u32, ext: &str) -> String {
    format!("{prefix}_{}.{sequence}{ext}", day.format(DAY_FORMAT))
}

/// Fields recovered from a backup file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupName {
    pub day: NaiveDate,
    pub sequence: u32,
    pub compression: Compression,
}

/// Parse `name` as a backup of `<prefix><ext>`. Anything that was not
/// produced by [`format_backup_name`] (optionally plus a compression suffix)
/// returns `None`.
pub fn parse_backup_name(name: &str, prefix: &str, ext: &str) -> Option<BackupName> {
    let compression = Compression::from_file_name(name);
    let base = match compression.suffix() {
        Some(suffix) => name.strip_suffix(suffix)?,
        None => name,
    };
    let middle = base
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(ext)?;
    let (day, sequence) = middle.split_once('.')?;
    if day.len() != 8 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = NaiveDate::parse_from_str(day, DAY_FORMAT).ok()?;
    let sequence: u32 = sequence.parse().ok()?;
    if sequence == 0 {
        return None;
    }
    Some(BackupName {
        day,
        sequence,
        compression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use logroll_core::OsFs;
    use std::fs;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn names_follow_day_and_sequence() {
        let dir = TempDir::new().unwrap();
        let mut namer = Namer::new(&dir.path().join("app.log"));
        let first = namer.backup_name(day(2024, 5, 1), &OsFs);
        assert_eq!(first, dir.path().join("app_20240501.1.log"));
    }

    #[test]
    fn same_day_rotations_get_distinct_names() {
        let dir = TempDir::new().unwrap();
        let mut namer = Namer::new(&dir.path().join("app.log"));
        let first = namer.backup_name(day(2024, 5, 1), &OsFs);
        fs::write(&first, b"one").unwrap();
        let second = namer.backup_name(day(2024, 5, 1), &OsFs);
        assert_eq!(second, dir.path().join("app_20240501.2.log"));
    }

    #[test]
    fn sequence_resets_on_new_day() {
        let dir = TempDir::new().unwrap();
        let mut namer = Namer::new(&dir.path().join("app.log"));
        namer.backup_name(day(2024, 5, 1), &OsFs);
        namer.backup_name(day(2024, 5, 1), &OsFs);
        assert_eq!(namer.sequence(), 2);
        let next = namer.backup_name(day(2024, 5, 2), &OsFs);
        assert_eq!(next, dir.path().join("app_20240502.1.log"));
    }

    #[test]
    fn skips_names_taken_on_disk_including_compressed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app_20240501.1.log"), b"x").unwrap();
        fs::write(dir.path().join("app_20240501.2.log.gz"), b"x").unwrap();
        fs::write(dir.path().join("app_20240501.3.log.xz"), b"x").unwrap();

        let mut namer = Namer::new(&dir.path().join("app.log"));
        let next = namer.backup_name(day(2024, 5, 1), &OsFs);
        assert_eq!(next, dir.path().join("app_20240501.4.log"));
    }

    #[test]
    fn parse_accepts_plain_and_compressed() {
        let parsed = parse_backup_name("app_20240501.12.log.gz", "app", ".log").unwrap();
        assert_eq!(parsed.day, day(2024, 5, 1));
        assert_eq!(parsed.sequence, 12);
        assert_eq!(parsed.compression, Compression::Gzip);

        let plain = parse_backup_name("app_20240501.3.log", "app", ".log").unwrap();
        assert_eq!(plain.compression, Compression::None);
    }

    #[test]
    fn parse_rejects_foreign_names() {
        for name in [
            "app.log",
            "app_notes.log",
            "app_20240501.log",
            "app_20240501.x.log",
            "app_20241341.1.log",
            "app_20240501.0.log",
            "other_20240501.1.log",
            "app_20240501.1.txt",
            "app_20240501.1.log.bz2",
        ] {
            assert!(
                parse_backup_name(name, "app", ".log").is_none(),
                "{name} should not parse as a backup"
            );
        }
    }

    #[test]
    fn round_trips_format() {
        let name = format_backup_name("svc", day(2023, 12, 31), 7, ".dbg");
        assert_eq!(name, "svc_20231231.7.dbg");
        let parsed = parse_backup_name(&name, "svc", ".dbg").unwrap();
        assert_eq!((parsed.day, parsed.sequence), (day(2023, 12, 31), 7));
    }
}
