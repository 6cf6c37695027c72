//! Domain types for rotation policy.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 100 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_AGE_DAYS: u32 = 31;
pub const DEFAULT_MAX_COUNT: usize = 0;

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// How rotated backups are compressed by the retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Xz,
}

impl Compression {
    /// Every suffix a compressed backup may carry, regardless of the active
    /// policy.
    pub const KNOWN_SUFFIXES: [&'static str; 2] = [".gz", ".xz"];

    /// Suffix appended to a backup name once compressed; `None` has none.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some(".gz"),
            Compression::Xz => Some(".xz"),
        }
    }

    /// Detect the compression of a file from its name.
    pub fn from_file_name(name: &str) -> Compression {
        if name.ends_with(".gz") {
            Compression::Gzip
        } else if name.ends_with(".xz") {
            Compression::Xz
        } else {
            Compression::None
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Compression::None
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "xz" => Ok(Compression::Xz),
            other => Err(format!(
                "unknown compression '{other}'; expected: none, gzip, xz"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// RotationConfig
// ---------------------------------------------------------------------------

/// Immutable rotation and retention policy for one active log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Canonical path of the active file. Backups live in its directory.
    #[serde(default = "crate::config::default_log_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// 0 disables age-based removal.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// 0 keeps every backup.
    #[serde(default)]
    pub max_count: usize,

    #[serde(default)]
    pub compression: Compression,

    /// External compressor argv. Reads the backup on stdin and writes the
    /// compressed stream to stdout. Replaces the built-in codec when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress_command: Option<Vec<String>>,

    #[serde(default = "default_true")]
    pub day_boundary_rotation: bool,
}

fn default_max_size_bytes() -> u64 {
    DEFAULT_MAX_SIZE_BYTES
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_true() -> bool {
    true
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self::for_path(crate::config::default_log_path())
    }
}

impl RotationConfig {
    /// Default policy for the given active file.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            max_count: DEFAULT_MAX_COUNT,
            compression: Compression::default(),
            compress_command: None,
            day_boundary_rotation: true,
        }
    }

    /// Check the invariants a policy must hold before a writer uses it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "log path {} has no file name",
                self.path.display()
            )));
        }
        if let Some(argv) = &self.compress_command {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "compress_command must name a program".to_string(),
                ));
            }
            if !self.compression.is_enabled() {
                return Err(ConfigError::Invalid(
                    "compress_command requires compression gzip or xz (it decides the suffix)"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    /// True when a retention pass has nothing to do.
    pub fn retention_disabled(&self) -> bool {
        self.max_count == 0 && self.max_age_days == 0 && !self.compression.is_enabled()
    }

    /// Directory holding the active file and its backups.
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// `(prefix, ext)` of the active file name: `app.log` → `("app", ".log")`.
    pub fn prefix_and_ext(&self) -> (String, String) {
        split_file_name(&self.path)
    }
}

/// Split a file name at its last extension; the dot stays with the extension.
pub fn split_file_name(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy());
            let prefix = name[..name.len() - ext.len()].to_string();
            (prefix, ext)
        }
        None => (name, String::new()),
    }
}
