//! Injected time source and file-stat accessor.
//!
//! Writers and retention passes never call `Utc::now()` or `fs::metadata`
//! directly; they go through these traits so tests can move time across a
//! day boundary or age a file without touching the real clock.

use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Source of the current instant. All calendar decisions are made in UTC.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Filesystem probe
// ---------------------------------------------------------------------------

/// The subset of file metadata rotation and retention decisions depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    /// Unix permission bits; `None` on platforms without them.
    pub mode: Option<u32>,
}

/// Stat-only view of the filesystem.
pub trait FsProbe: Send + Sync {
    /// `io::ErrorKind::NotFound` means the file is absent.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_ok()
    }
}

/// Probe backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl FsProbe for OsFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified().map(DateTime::<Utc>::from)?;
        Ok(FileStat {
            len: meta.len(),
            modified,
            is_dir: meta.is_dir(),
            mode: mode_bits(&meta),
        })
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_bits(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn manual_clock_advances_across_midnight() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap());
        let before = clock.today();
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today(), before.succ_opt().unwrap());
    }

    #[test]
    fn os_probe_reports_missing_as_not_found() {
        let dir = TempDir::new().unwrap();
        let err = OsFs.stat(&dir.path().join("absent.log")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!OsFs.exists(&dir.path().join("absent.log")));
    }

    #[test]
    fn os_probe_reports_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"hello").unwrap();
        let stat = OsFs.stat(&path).unwrap();
        assert_eq!(stat.len, 5);
        assert!(!stat.is_dir);
    }
}
