use std::io;
use std::path::PathBuf;

use thiserror::Error;

use logroll_core::ConfigError;

/// Error surface for writing, rotating, and retention passes.
#[derive(Debug, Error)]
pub enum RotateError {
    /// A single write larger than the file cap. Nothing was written.
    #[error("write length {len} exceeds maximum file size {max}")]
    WriteTooLarge { len: usize, max: u64 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to compress {path}: {source}")]
    Compress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The background retention thread could not be started.
    #[error("failed to start compaction worker thread: {source}")]
    WorkerSpawn {
        #[source]
        source: io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: io::Error) -> RotateError {
    RotateError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn compress_err(path: impl Into<PathBuf>, source: io::Error) -> RotateError {
    RotateError::Compress {
        path: path.into(),
        source,
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        let message = err.to_string();
        match err {
            RotateError::WriteTooLarge { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, message)
            }
            RotateError::Io { source, .. }
            | RotateError::Compress { source, .. }
            | RotateError::WorkerSpawn { source } => io::Error::new(source.kind(), message),
            _ => io::Error::new(io::ErrorKind::Other, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_spawn_failure_names_the_thread_not_a_path() {
        let err = RotateError::WorkerSpawn {
            source: io::Error::new(io::ErrorKind::WouldBlock, "resource temporarily unavailable"),
        };
        let text = err.to_string();
        assert!(text.contains("compaction worker thread"), "got: {text}");
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn io_error_keeps_kind_and_path() {
        let err = io_err("/var/log/app.log", io::Error::from(io::ErrorKind::PermissionDenied));
        let converted = io::Error::from(err);
        assert_eq!(converted.kind(), io::ErrorKind::PermissionDenied);
        assert!(converted.to_string().contains("/var/log/app.log"));
    }
}
