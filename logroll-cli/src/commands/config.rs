//! `logroll config`: show or persist the effective policy.

use anyhow::{Context, Result};
use clap::Args;

use logroll_core::config;

use super::PolicyArgs;

/// Arguments for `logroll config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Write the effective policy back to the config file.
    #[arg(long)]
    pub save: bool,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let effective = self.policy.resolve()?;
        if self.save {
            let path = match &self.policy.config {
                Some(path) => path.clone(),
                None => config::config_path_at(&config::home()?),
            };
            config::save_at(&path, &effective)
                .with_context(|| format!("failed to save {}", path.display()))?;
            tracing::info!(path = %path.display(), "saved rotation policy");
        }
        print!(
            "{}",
            serde_yaml::to_string(&effective).context("failed to serialize policy")?
        );
        Ok(())
    }
}
