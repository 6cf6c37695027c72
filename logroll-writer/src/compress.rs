//! Backup compressors.
//!
//! A [`Compressor`] turns `src` into `dst` and deletes `src` only once `dst`
//! is complete. A partial `dst` is removed on failure so the next retention
//! pass retries from the untouched source.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use logroll_core::{Compression, RotationConfig};

use crate::error::{compress_err, io_err, RotateError};

pub trait Compressor: Send + Sync + fmt::Debug {
    fn compress(&self, src: &Path, dst: &Path) -> Result<(), RotateError>;
}

/// Pick the compressor a policy asks for. `None` when compression is off.
pub fn compressor_for(config: &RotationConfig) -> Option<Arc<dyn Compressor>> {
    if let Some(argv) = &config.compress_command {
        if config.compression.is_enabled() {
            return Some(Arc::new(CommandCompressor::new(argv.clone())));
        }
    }
    match config.compression {
        Compression::None => None,
        Compression::Gzip => Some(Arc::new(GzipCompressor::default())),
        Compression::Xz => Some(Arc::new(XzCompressor::default())),
    }
}

// ---------------------------------------------------------------------------
// Built-in codecs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: flate2::Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, src: &Path, dst: &Path) -> Result<(), RotateError> {
        replace_with(src, dst, |mut input, output| {
            let mut encoder = GzEncoder::new(output, self.level);
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?.sync_all()
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct XzCompressor {
    preset: u32,
}

impl Default for XzCompressor {
    fn default() -> Self {
        Self { preset: 6 }
    }
}

impl XzCompressor {
    pub fn with_preset(preset: u32) -> Self {
        Self {
            preset: preset.min(9),
        }
    }
}

impl Compressor for XzCompressor {
    fn compress(&self, src: &Path, dst: &Path) -> Result<(), RotateError> {
        replace_with(src, dst, |mut input, output| {
            let mut encoder = XzEncoder::new(output, self.preset);
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?.sync_all()
        })
    }
}

// ---------------------------------------------------------------------------
// External program
// ---------------------------------------------------------------------------

/// Runs `argv` with the backup on stdin and `dst` as stdout, e.g.
/// `["gzip", "-c"]` or `["xz", "-9", "-c"]`.
#[derive(Debug, Clone)]
pub struct CommandCompressor {
    argv: Vec<String>,
}

impl CommandCompressor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl Compressor for CommandCompressor {
    fn compress(&self, src: &Path, dst: &Path) -> Result<(), RotateError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(compress_err(
                src,
                io::Error::new(io::ErrorKind::InvalidInput, "empty compress command"),
            ));
        };
        replace_with(src, dst, |input, output| {
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::from(input.into_inner()))
                .stdout(Stdio::from(output))
                .stderr(Stdio::piped())
                .spawn()?;
            let finished = child.wait_with_output()?;
            if !finished.status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!(
                        "{program} exited with {}: {}",
                        finished.status,
                        String::from_utf8_lossy(&finished.stderr).trim()
                    ),
                ));
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// Open `src`, create `dst` with the same permission bits, run `encode`, then
/// remove `src`. On encode failure `dst` is removed and `src` stays.
fn replace_with<F>(src: &Path, dst: &Path, encode: F) -> Result<(), RotateError>
where
    F: FnOnce(BufReader<File>, File) -> io::Result<()>,
{
    let input = File::open(src).map_err(|e| compress_err(src, e))?;
    let meta = input.metadata().map_err(|e| compress_err(src, e))?;
    // An existing dst is a leftover from an interrupted attempt.
    let output = create_like(dst, &meta).map_err(|e| compress_err(dst, e))?;

    if let Err(err) = encode(BufReader::new(input), output) {
        let _ = fs::remove_file(dst);
        return Err(compress_err(src, err));
    }

    fs::remove_file(src).map_err(|e| io_err(src, e))?;
    Ok(())
}

#[cfg(unix)]
fn create_like(dst: &Path, meta: &fs::Metadata) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mode = meta.permissions().mode() & 0o7777;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(dst)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_like(dst: &Path, _meta: &fs::Metadata) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dst)
}

/// Reader over a plain, `.gz`, or `.xz` log file, chosen by suffix.
pub fn open_reader(path: &Path) -> Result<Box<dyn Read>, RotateError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reader: Box<dyn Read> = match Compression::from_file_name(&name) {
        Compression::Gzip => Box::new(GzDecoder::new(BufReader::new(file))),
        Compression::Xz => Box::new(XzDecoder::new(BufReader::new(file))),
        Compression::None => Box::new(BufReader::new(file)),
    };
    Ok(reader)
}

/// Copy a log file, decompressing if needed, into `out`.
pub fn copy_decoded(path: &Path, out: &mut dyn Write) -> Result<u64, RotateError> {
    let mut reader = open_reader(path)?;
    io::copy(&mut reader, out).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backup(dir: &TempDir, name: &str, body: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn decoded(path: &Path) -> Vec<u8> {
        let mut out = Vec::new();
        copy_decoded(path, &mut out).unwrap();
        out
    }

    #[test]
    fn gzip_replaces_source() {
        let dir = TempDir::new().unwrap();
        let src = backup(&dir, "app_20240501.1.log", b"line one\nline two\n");
        let dst = dir.path().join("app_20240501.1.log.gz");

        GzipCompressor::default().compress(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(decoded(&dst), b"line one\nline two\n");
    }

    #[test]
    fn xz_replaces_source() {
        let dir = TempDir::new().unwrap();
        let src = backup(&dir, "app_20240501.1.log", b"xz body\n");
        let dst = dir.path().join("app_20240501.1.log.xz");

        XzCompressor::with_preset(1).compress(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(decoded(&dst), b"xz body\n");
    }

    #[test]
    fn missing_source_is_a_compress_error() {
        let dir = TempDir::new().unwrap();
        let err = GzipCompressor::default()
            .compress(&dir.path().join("gone.log"), &dir.path().join("gone.log.gz"))
            .unwrap_err();
        assert!(matches!(err, RotateError::Compress { .. }), "got: {err}");
        assert!(!dir.path().join("gone.log.gz").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_keeps_source_and_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let src = backup(&dir, "app_20240501.1.log", b"keep me\n");
        let dst = dir.path().join("app_20240501.1.log.gz");

        let err = CommandCompressor::new(vec!["false".to_string()])
            .compress(&src, &dst)
            .unwrap_err();

        assert!(matches!(err, RotateError::Compress { .. }), "got: {err}");
        assert!(src.exists());
        assert!(!dst.exists());
    }

    #[cfg(unix)]
    #[test]
    fn external_command_output_is_written_to_destination() {
        let dir = TempDir::new().unwrap();
        let src = backup(&dir, "app_20240501.1.log", b"via cat\n");
        let dst = dir.path().join("app_20240501.1.log.copy");

        CommandCompressor::new(vec!["cat".to_string()])
            .compress(&src, &dst)
            .unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"via cat\n");
    }

    #[cfg(unix)]
    #[test]
    fn compressed_file_keeps_source_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let src = backup(&dir, "app_20240501.1.log", b"mode\n");
        fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).unwrap();
        let dst = dir.path().join("app_20240501.1.log.gz");

        GzipCompressor::default().compress(&src, &dst).unwrap();

        let mode = fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn compressor_for_follows_policy() {
        let mut cfg = RotationConfig::for_path("/tmp/app.log");
        cfg.compression = Compression::None;
        assert!(compressor_for(&cfg).is_none());

        cfg.compression = Compression::Xz;
        assert!(format!("{:?}", compressor_for(&cfg).unwrap()).contains("Xz"));

        cfg.compress_command = Some(vec!["xz".to_string(), "-c".to_string()]);
        assert!(format!("{:?}", compressor_for(&cfg).unwrap()).contains("Command"));
    }
}
