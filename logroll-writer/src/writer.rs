//! The rotating append sink.
//!
//! A [`RotatingWriter`] owns one active file at a canonical path. Before any
//! write is applied it checks two conditions and rotates first if either
//! holds:
//!
//! 1. current size + pending write would exceed `max_size_bytes`
//! 2. the active file was opened on an earlier UTC day
//!
//! so no file ever holds more than `max_size_bytes` or spans two days.
//! Rotation renames the active file to a [`Namer`] backup, reopens a fresh
//! active file with the old permission bits, and signals the
//! [`CompactionWorker`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;

use logroll_core::{Clock, FsProbe, OsFs, RotationConfig, SystemClock};

use crate::compaction::{CompactionWorker, PassContext};
use crate::compress::{compressor_for, Compressor};
use crate::error::{io_err, RotateError};
use crate::namer::Namer;
use crate::retention::RetentionReport;

/// Mode for a brand-new active file.
pub const NEW_FILE_MODE: u32 = 0o600;
/// Mode for directories created on the way to the active file.
pub const DIR_MODE: u32 = 0o755;

struct ActiveFile {
    file: File,
    size: u64,
    opened_on: NaiveDate,
}

/// What must happen before a write can be applied.
enum Step {
    Open,
    Rotate,
    Redate,
    Append,
}

struct WriterState {
    active: Option<ActiveFile>,
    namer: Namer,
}

/// Size- and day-bounded append-only log file.
///
/// `write`, `rotate`, and `close` serialize on one mutex. Retention runs on
/// a separate thread and never takes that mutex.
pub struct RotatingWriter {
    config: Arc<RotationConfig>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn FsProbe>,
    state: Mutex<WriterState>,
    compaction: CompactionWorker,
}

/// Builder for [`RotatingWriter`]; the clock, probe, and compressor default
/// to the wall clock, the real filesystem, and the policy's codec.
pub struct RotatingWriterBuilder {
    config: RotationConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn FsProbe>,
    compressor: Option<Option<Arc<dyn Compressor>>>,
}

impl RotatingWriterBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn FsProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Override the compressor chosen from the policy.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(Some(compressor));
        self
    }

    /// Validate the policy and start the compaction worker.
    pub fn build(self) -> Result<RotatingWriter, RotateError> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let compressor = self
            .compressor
            .unwrap_or_else(|| compressor_for(&config));

        let compaction = CompactionWorker::spawn(PassContext {
            config: config.clone(),
            clock: self.clock.clone(),
            probe: self.probe.clone(),
            compressor,
        })?;

        Ok(RotatingWriter {
            state: Mutex::new(WriterState {
                active: None,
                namer: Namer::new(&config.path),
            }),
            config,
            clock: self.clock,
            probe: self.probe,
            compaction,
        })
    }
}

impl RotatingWriter {
    pub fn builder(config: RotationConfig) -> RotatingWriterBuilder {
        RotatingWriterBuilder {
            config,
            clock: Arc::new(SystemClock),
            probe: Arc::new(OsFs),
            compressor: None,
        }
    }

    /// Writer with the wall clock and the real filesystem.
    pub fn new(config: RotationConfig) -> Result<Self, RotateError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn compaction(&self) -> &CompactionWorker {
        &self.compaction
    }

    /// Append `buf` to the active file, rotating first if needed.
    ///
    /// A buffer longer than `max_size_bytes` is rejected before anything is
    /// touched. On error nothing counts as written.
    pub fn write(&self, buf: &[u8]) -> Result<usize, RotateError> {
        let len = buf.len() as u64;
        if len > self.config.max_size_bytes {
            return Err(RotateError::WriteTooLarge {
                len: buf.len(),
                max: self.config.max_size_bytes,
            });
        }

        let mut state = self.lock();
        let today = self.clock.today();

        match self.next_step(&state, len, today) {
            Step::Open => self.open_existing_or_new(&mut state, len, today)?,
            Step::Rotate => self.rotate_locked(&mut state, today)?,
            Step::Redate => {
                // Empty file: nothing from the old day to keep.
                if let Some(active) = state.active.as_mut() {
                    active.opened_on = today;
                }
            }
            Step::Append => {}
        }

        let path = &self.config.path;
        let Some(active) = state.active.as_mut() else {
            return Err(io_err(path, io::Error::new(io::ErrorKind::NotFound, "no active file")));
        };
        if let Err(err) = active.file.write_all(buf) {
            // Re-sync with whatever part of the buffer reached the disk.
            if let Ok(stat) = self.probe.stat(path) {
                active.size = stat.len;
            }
            return Err(io_err(path, err));
        }
        active.size += len;
        Ok(buf.len())
    }

    /// Rotate now, regardless of size or day. With no active file on disk
    /// this only creates a fresh one.
    pub fn rotate(&self) -> Result<(), RotateError> {
        let mut state = self.lock();
        let today = self.clock.today();
        self.rotate_locked(&mut state, today)
    }

    /// Close the active file. The next write reopens it. The compaction
    /// worker keeps running.
    pub fn close(&self) -> Result<(), RotateError> {
        let mut state = self.lock();
        match state.active.take() {
            Some(active) => active
                .file
                .sync_all()
                .map_err(|e| io_err(&self.config.path, e)),
            None => Ok(()),
        }
    }

    /// Flush the active file to the OS.
    pub fn flush(&self) -> Result<(), RotateError> {
        let mut state = self.lock();
        match state.active.as_mut() {
            Some(active) => active
                .file
                .flush()
                .map_err(|e| io_err(&self.config.path, e)),
            None => Ok(()),
        }
    }

    /// Size of the active file as tracked by the writer; `None` when closed.
    pub fn current_size(&self) -> Option<u64> {
        self.lock().active.as_ref().map(|a| a.size)
    }

    /// Run one retention pass on the calling thread. `None` if the worker is
    /// in the middle of one.
    pub fn prune_now(&self) -> Option<Result<RetentionReport, RotateError>> {
        self.compaction.run_now()
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_step(&self, state: &WriterState, pending: u64, today: NaiveDate) -> Step {
        let Some(active) = state.active.as_ref() else {
            return Step::Open;
        };
        if active.size + pending > self.config.max_size_bytes {
            return Step::Rotate;
        }
        if self.crossed_day(active.opened_on, today) {
            return if active.size == 0 {
                Step::Redate
            } else {
                Step::Rotate
            };
        }
        Step::Append
    }

    fn crossed_day(&self, opened_on: NaiveDate, today: NaiveDate) -> bool {
        self.config.day_boundary_rotation && opened_on != today
    }

    /// First open after construction or `close`. Reuses the file on disk when
    /// it has room for `pending` bytes and belongs to today.
    fn open_existing_or_new(
        &self,
        state: &mut WriterState,
        pending: u64,
        today: NaiveDate,
    ) -> Result<(), RotateError> {
        let path = &self.config.path;
        let stat = match self.probe.stat(path) {
            Ok(stat) => stat,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.open_new(state, None, today)?;
                self.compaction.signal();
                return Ok(());
            }
            Err(err) => return Err(io_err(path, err)),
        };

        let written_on = stat.modified.date_naive();
        let full = stat.len + pending > self.config.max_size_bytes;
        let stale = stat.len > 0 && self.crossed_day(written_on, today);
        if full || stale {
            return self.rotate_locked(state, today);
        }

        match OpenOptions::new().append(true).open(path) {
            Ok(file) => {
                tracing::debug!(path = %path.display(), size = stat.len, "reopened active log file");
                state.active = Some(ActiveFile {
                    file,
                    size: stat.len,
                    opened_on: today,
                });
                self.compaction.signal();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot reopen active log file; rotating it away");
                self.rotate_locked(state, today)
            }
        }
    }

    fn rotate_locked(&self, state: &mut WriterState, today: NaiveDate) -> Result<(), RotateError> {
        let content_day = match state.active.take() {
            Some(active) => {
                // Close before rename.
                drop(active.file);
                Some(active.opened_on)
            }
            None => None,
        };
        if let Some(backup) = self.open_new(state, content_day, today)? {
            tracing::info!(
                path = %self.config.path.display(),
                backup = %backup.display(),
                "log file rotated",
            );
            self.compaction.signal();
        }
        Ok(())
    }

    /// Move any file at the canonical path to a backup and open a fresh,
    /// truncated active file. Returns the backup path if a file was moved.
    ///
    /// `content_day` names the backup; when unknown it is taken from the old
    /// file's modification time.
    fn open_new(
        &self,
        state: &mut WriterState,
        content_day: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Option<PathBuf>, RotateError> {
        let path = &self.config.path;
        create_log_dir(self.config.dir())?;

        let mut mode = NEW_FILE_MODE;
        let mut backup = None;
        match self.probe.stat(path) {
            Ok(stat) => {
                mode = stat.mode.unwrap_or(NEW_FILE_MODE);
                let day = content_day.unwrap_or_else(|| stat.modified.date_naive());
                let target = state.namer.backup_name(day, self.probe.as_ref());
                fs::rename(path, &target).map_err(|e| io_err(&target, e))?;
                backup = Some(target);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(path, err)),
        }

        // Truncate: anything that appeared at the path since the rename is
        // not ours.
        let file = open_truncated(path, mode).map_err(|e| io_err(path, e))?;
        state.active = Some(ActiveFile {
            file,
            size: 0,
            opened_on: today,
        });
        Ok(backup)
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

#[cfg(unix)]
fn create_log_dir(dir: &Path) -> Result<(), RotateError> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
        .map_err(|e| io_err(dir, e))
}

#[cfg(not(unix))]
fn create_log_dir(dir: &Path) -> Result<(), RotateError> {
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))
}

#[cfg(unix)]
fn open_truncated(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    // umask may have stripped bits from the preserved mode.
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_truncated(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}
