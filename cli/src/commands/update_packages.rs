//! `spell update-packages --patch FILE`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::application::spells::UpdatePackages;
use crate::domain::packages::PatchFile;

#[derive(Args, Clone, Debug)]
pub struct UpdatePackagesArgs {
    /// Patch file listing applications and the packages to update
    #[arg(long)]
    pub patch: PathBuf,
}

impl UpdatePackagesArgs {
    /// # Errors
    ///
    /// Returns an error if the patch file cannot be read or fails validation.
    pub fn into_command(self, models: Vec<String>) -> Result<UpdatePackages> {
        let content = std::fs::read_to_string(&self.patch)
            .with_context(|| format!("cannot read {}", self.patch.display()))?;
        let patch = PatchFile::from_yaml(&content)
            .with_context(|| format!("in {}", self.patch.display()))?;
        Ok(UpdatePackages { patch, models })
    }
}
