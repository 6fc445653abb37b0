//! Concrete commands.

pub mod config;
pub mod controller;
pub mod list_models;
pub mod packages;
pub mod ping;
pub mod user;

pub use config::{ApplicationConfig, Config, ConfigAction};
pub use controller::{ShowController, Status};
pub use list_models::ListModels;
pub use packages::UpdatePackages;
pub use ping::Ping;
pub use user::{AddUser, DisableUser, EnableUser, Grant, RemoveUser, Revoke, RevokeModel};

use crate::domain::filter::ModelSelector;
use crate::domain::target::TargetConfig;

/// Model selector of a command run on `target`.
fn selector(models: &[String], target: &TargetConfig) -> ModelSelector {
    ModelSelector::resolve(models, &target.model_mapping)
}
