//! `spell config`: read or change application configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::application::spells::{ApplicationConfig, Config, ConfigAction};

#[derive(Args, Clone, Debug)]
#[command(group = clap::ArgGroup::new("source").required(true).args(["app", "file"]))]
pub struct ConfigArgs {
    /// Application to read or change
    #[arg(long)]
    pub app: Option<String>,

    /// Only show this key
    #[arg(long, requires = "app")]
    pub get: Option<String>,

    /// Set KEY=VALUE (repeatable)
    #[arg(long, requires = "app")]
    pub set: Vec<String>,

    /// YAML list of `{application, config}` entries to apply
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl ConfigArgs {
    /// # Errors
    ///
    /// Returns an error for a malformed `--set` pair or an unreadable config file.
    pub fn into_command(self, models: Vec<String>) -> Result<Config> {
        let action = match (self.app, self.file) {
            (Some(application), _) => ConfigAction::App {
                application,
                get: self.get,
                set: parse_settings(&self.set)?,
            },
            (None, Some(path)) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                ConfigAction::File(parse_config_file(&content)?)
            }
            (None, None) => bail!("either --app or --file is required"),
        };
        Ok(Config { models, action })
    }
}

/// Parses `KEY=VALUE` pairs; the value may itself contain `=`.
fn parse_settings(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("invalid setting '{pair}', expected KEY=VALUE"),
        })
        .collect()
}

fn parse_config_file(content: &str) -> Result<Vec<ApplicationConfig>> {
    serde_yaml::from_str(content).context("invalid config file")
}
