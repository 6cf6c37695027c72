//! YAML rotation policy and default on-disk locations.
//!
//! # Storage layout
//!
//! ```text
//! ~/.logroll/
//!   config.yaml         (rotation policy, mode 0600)
//!   logs/
//!     <process>.log     (default active file)
//! ```
//!
//! # API pattern
//!
//! Every function that needs a home directory has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::RotationConfig;

pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.logroll/`
pub fn logroll_root(home: &Path) -> PathBuf {
    home.join(".logroll")
}

/// `<home>/.logroll/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    logroll_root(home).join(CONFIG_FILE)
}

/// `<home>/.logroll/logs/`
pub fn logs_dir_at(home: &Path) -> PathBuf {
    logroll_root(home).join("logs")
}

/// `<home>/.logroll/logs/<process>.log`
pub fn default_log_path_at(home: &Path) -> PathBuf {
    logs_dir_at(home).join(format!("{}.log", process_name()))
}

/// `<tmp>/<process>.log`; used when a config file omits `path`.
pub fn default_log_path() -> PathBuf {
    std::env::temp_dir().join(format!("{}.log", process_name()))
}

/// File stem of the running executable, `logroll` when unknown.
pub fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "logroll".to_string())
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate a policy from a YAML file.
///
/// Returns `ConfigError::Io` if unreadable, `ConfigError::Parse` (with path)
/// if malformed, `ConfigError::Invalid` if an invariant is broken.
pub fn load_at(path: &Path) -> Result<RotationConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: RotationConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_at`], but a missing file yields the defaults for `home`.
pub fn load_or_default_at(home: &Path, path: &Path) -> Result<RotationConfig, ConfigError> {
    if !path.exists() {
        return Ok(RotationConfig::for_path(default_log_path_at(home)));
    }
    load_at(path)
}

/// `load_or_default_at` for `~/.logroll/config.yaml`.
pub fn load_default() -> Result<RotationConfig, ConfigError> {
    let home = home()?;
    load_or_default_at(&home, &config_path_at(&home))
}

// ---------------------------------------------------------------------------
// 3. Save
// ---------------------------------------------------------------------------

/// Write a policy as YAML, creating parent directories. The file is mode 0600.
pub fn save_at(path: &Path, config: &RotationConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml).map_err(|e| io_err(path, e))?;
    set_file_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
