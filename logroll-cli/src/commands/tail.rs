//! `logroll tail`: last lines of the active file, optionally followed across
//! rotations.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use super::PolicyArgs;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments for `logroll tail`.
#[derive(Args, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Number of lines to show.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub lines: usize,

    /// Keep printing new lines, following the active file across rotations.
    #[arg(long, short = 'f')]
    pub follow: bool,
}

impl TailArgs {
    pub fn run(self) -> Result<()> {
        let config = self.policy.resolve()?;
        let path = config.path;
        let stdout = io::stdout();
        let mut out = stdout.lock();

        if !self.follow {
            if !path.exists() {
                println!("log file not found: {}", path.display());
                return Ok(());
            }
            let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
            return write_tail(&file, self.lines, &mut out)
                .with_context(|| format!("read {}", path.display()));
        }

        let mut follower = Follower::new(path.clone());
        if let Some(file) = follower.open_current()? {
            write_tail(file, self.lines, &mut out)
                .with_context(|| format!("read {}", path.display()))?;
            follower.mark_position()?;
        } else {
            tracing::info!(path = %path.display(), "waiting for log file to appear");
        }
        loop {
            follower
                .poll(&mut out)
                .with_context(|| format!("follow {}", path.display()))?;
            out.flush().context("failed to flush stdout")?;
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Write the last `lines` records of `file` to `out`, bytes unchanged.
fn write_tail(file: &File, lines: usize, out: &mut dyn Write) -> io::Result<()> {
    for record in last_lines(BufReader::new(file), lines)? {
        out.write_all(&record)?;
        if !record.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn last_lines(mut reader: impl BufRead, lines: usize) -> io::Result<VecDeque<Vec<u8>>> {
    let mut tail = VecDeque::new();
    if lines == 0 {
        return Ok(tail);
    }
    loop {
        let mut record = Vec::new();
        if reader.read_until(b'\n', &mut record)? == 0 {
            break;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(record);
    }
    Ok(tail)
}

// ---------------------------------------------------------------------------
// Follow
// ---------------------------------------------------------------------------

/// Reads whatever is appended to the file at `path`. When rotation puts a new
/// file at the path, the rest of the old one is drained before switching.
struct Follower {
    path: PathBuf,
    file: Option<File>,
    id: Option<FileId>,
    pos: u64,
}

impl Follower {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            id: None,
            pos: 0,
        }
    }

    /// Open the file at the path from its start. `None` while it is absent.
    fn open_current(&mut self) -> io::Result<Option<&File>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        self.id = file_id(&file.metadata()?);
        self.pos = 0;
        self.file = Some(file);
        Ok(self.file.as_ref())
    }

    /// Record where the reader stopped on the open file.
    fn mark_position(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            self.pos = file.stream_position()?;
        }
        Ok(())
    }

    /// Copy new bytes to `out`. Returns how many were copied.
    fn poll(&mut self, out: &mut dyn Write) -> io::Result<u64> {
        let mut copied = 0;
        let current = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        if self.file.is_none() {
            if current.is_none() {
                return Ok(0);
            }
            self.open_current()?;
        } else if let Some(meta) = &current {
            let replaced = match (self.id, file_id(meta)) {
                (Some(old), Some(new)) => old != new,
                _ => false,
            };
            if replaced {
                copied += self.drain(out)?;
                self.open_current()?;
            } else if meta.len() < self.pos {
                // Truncated in place, or replaced where identity is unknown.
                self.open_current()?;
            }
        }

        copied += self.drain(out)?;
        Ok(copied)
    }

    fn drain(&mut self, out: &mut dyn Write) -> io::Result<u64> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        file.seek(SeekFrom::Start(self.pos))?;
        let copied = io::copy(file, out)?;
        self.pos += copied;
        Ok(copied)
    }
}

type FileId = (u64, u64);

#[cfg(unix)]
fn file_id(meta: &fs::Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &fs::Metadata) -> Option<FileId> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use logroll_core::{Compression, RotationConfig};
    use logroll_writer::RotatingWriter;
    use tempfile::TempDir;

    #[test]
    fn keeps_only_the_last_lines() {
        let input = "a\nb\nc\nd\n";
        let tail = last_lines(input.as_bytes(), 2).unwrap();
        assert_eq!(tail, [b"c\n".to_vec(), b"d\n".to_vec()]);
    }

    #[test]
    fn zero_lines_reads_nothing() {
        assert!(last_lines("a\n".as_bytes(), 0).unwrap().is_empty());
    }

    #[test]
    fn huge_line_count_does_not_preallocate() {
        let tail = last_lines("a\nb\n".as_bytes(), usize::MAX).unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn non_utf8_lines_pass_through() {
        let tail = last_lines(&b"ok\n\xff\xfe\n"[..], 1).unwrap();
        assert_eq!(tail, [b"\xff\xfe\n".to_vec()]);
    }

    #[test]
    fn follower_picks_up_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, b"old\n").unwrap();

        let mut follower = Follower::new(path.clone());
        follower.open_current().unwrap();
        let mut sink = Vec::new();
        follower.poll(&mut sink).unwrap();
        assert_eq!(sink, b"old\n");

        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"new\n")
            .unwrap();
        sink.clear();
        assert_eq!(follower.poll(&mut sink).unwrap(), 4);
        assert_eq!(sink, b"new\n");
    }

    #[test]
    fn follower_waits_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut follower = Follower::new(path.clone());
        let mut sink = Vec::new();
        assert_eq!(follower.poll(&mut sink).unwrap(), 0);

        fs::write(&path, b"hello\n").unwrap();
        follower.poll(&mut sink).unwrap();
        assert_eq!(sink, b"hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn follower_crosses_rotation() {
        let dir = TempDir::new().unwrap();
        let mut config = RotationConfig::for_path(dir.path().join("app.log"));
        config.max_age_days = 0;
        config.compression = Compression::None;
        let writer = RotatingWriter::new(config).unwrap();
        writer.write(b"one\n").unwrap();

        let mut follower = Follower::new(writer.path().to_path_buf());
        let file = follower.open_current().unwrap().expect("active file");
        let mut sink = Vec::new();
        write_tail(file, 10, &mut sink).unwrap();
        follower.mark_position().unwrap();
        assert_eq!(sink, b"one\n");

        writer.write(b"two\n").unwrap();
        writer.rotate().unwrap();
        writer.write(b"three\n").unwrap();

        sink.clear();
        follower.poll(&mut sink).unwrap();
        assert_eq!(sink, b"two\nthree\n");
    }
}
