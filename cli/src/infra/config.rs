//! Infrastructure implementation of the `ConfigStore` port.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;

const PERSONAL_CONFIG: &str = "config.personal.yaml";

/// Reads the global config and the optional personal config beside it.
#[derive(Default)]
pub struct YamlConfigStore {
    path: Option<PathBuf>,
}

impl YamlConfigStore {
    /// Store reading an explicit global config file (`--config`).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn read(path: &Path) -> Result<serde_yaml::Value> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }
}

impl ConfigStore for YamlConfigStore {
    fn load_sources(&self) -> Result<(serde_yaml::Value, Option<serde_yaml::Value>)> {
        let path = self.path()?;
        if !path.exists() {
            anyhow::bail!(
                "configuration file {} not found; set SPELL_CONFIG or pass --config",
                path.display()
            );
        }
        let global = Self::read(&path)?;
        let personal_path = path.with_file_name(PERSONAL_CONFIG);
        let personal = if personal_path.exists() {
            Some(Self::read(&personal_path)?)
        } else {
            None
        };
        Ok((global, personal))
    }

    fn path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Ok(val) = std::env::var("SPELL_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        let data =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
        Ok(data.join("spell").join("config.yaml"))
    }
}
