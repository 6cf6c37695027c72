pub mod cat;
pub mod config;
pub mod ls;
pub mod prune;
pub mod tail;
pub mod write;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use logroll_core::{config as core_config, Compression, RotationConfig};

/// Policy flags shared by every command. Flags win over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Config file (default: ~/.logroll/config.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Active log file path.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Rotate once the active file would exceed this many MiB.
    #[arg(long)]
    pub max_size_mb: Option<u64>,

    /// Remove backups older than this many days (0 disables).
    #[arg(long)]
    pub max_age_days: Option<u32>,

    /// Keep at most this many backups (0 keeps all).
    #[arg(long)]
    pub max_count: Option<usize>,

    /// Backup compression: none, gzip, xz.
    #[arg(long)]
    pub compression: Option<Compression>,
}

impl PolicyArgs {
    /// Config file (or defaults) with flags applied, validated.
    pub fn resolve(&self) -> Result<RotationConfig> {
        let home = core_config::home().context("could not determine home directory")?;
        let file = self
            .config
            .clone()
            .unwrap_or_else(|| core_config::config_path_at(&home));
        let mut cfg = core_config::load_or_default_at(&home, &file)
            .with_context(|| format!("failed to load {}", file.display()))?;
        self.apply(&mut cfg);
        cfg.validate().context("invalid rotation policy")?;
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut RotationConfig) {
        if let Some(path) = &self.path {
            cfg.path = path.clone();
        }
        if let Some(mb) = self.max_size_mb {
            cfg.max_size_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(days) = self.max_age_days {
            cfg.max_age_days = days;
        }
        if let Some(count) = self.max_count {
            cfg.max_count = count;
        }
        if let Some(compression) = self.compression {
            cfg.compression = compression;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let mut cfg = RotationConfig::for_path("/var/log/app.log");
        let args = PolicyArgs {
            path: Some(PathBuf::from("/tmp/other.log")),
            max_size_mb: Some(2),
            max_count: Some(3),
            compression: Some(Compression::Xz),
            ..PolicyArgs::default()
        };
        args.apply(&mut cfg);
        assert_eq!(cfg.path, PathBuf::from("/tmp/other.log"));
        assert_eq!(cfg.max_size_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.max_count, 3);
        assert_eq!(cfg.max_age_days, 31);
        assert_eq!(cfg.compression, Compression::Xz);
    }
}
