//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::application::spells::{ListModels, Ping, ShowController, Status};
use crate::commands::{self, TargetArgs};
use crate::domain::cache::CachePolicy;
use crate::infra::cache::FileCacheStore;

/// Run commands across many Juju controllers at once
#[derive(Parser)]
#[command(
    name = "spell",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// More logging (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Global configuration file (default: $SPELL_CONFIG or <data dir>/spell/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(short = 'y', long, global = true, visible_alias = "silent")]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that controllers are reachable
    Ping(TargetArgs),

    /// Show controller information
    ShowController(TargetArgs),

    /// Show status of models
    Status(TargetArgs),

    /// List models, from the local cache when fresh
    ListModels {
        #[command(flatten)]
        target: TargetArgs,
        /// Ignore the cache and list from the controller
        #[arg(long)]
        refresh: bool,
    },

    /// Create a user, enable it and optionally grant access
    AddUser {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::AddUserArgs,
    },

    /// Revoke a user's access and disable it
    RemoveUser {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::UserArgs,
    },

    /// Enable a user
    EnableUser {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::UserArgs,
    },

    /// Disable a user
    DisableUser {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::UserArgs,
    },

    /// Grant controller and model access to a user
    Grant {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::GrantArgs,
    },

    /// Revoke access from a user
    Revoke {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::user::RevokeArgs,
    },

    /// Update packages on application units from a patch file
    UpdatePackages {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::update_packages::UpdatePackagesArgs,
    },

    /// Get or set application configuration
    Config {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        args: commands::config::ConfigArgs,
    },
}

impl Cli {
    /// Checks flag combinations the derive attributes cannot express.
    ///
    /// # Errors
    ///
    /// Returns a usage error for `--models` on `list-models`, which always
    /// lists every model.
    pub fn validate(&self) -> Result<(), clap::Error> {
        match &self.command {
            Command::ListModels { target, .. } if !target.models.is_empty() => {
                Err(Self::command().error(
                    ErrorKind::ArgumentConflict,
                    "--models cannot be used with list-models; it always lists every model",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Execute the CLI command.
    ///
    /// Returns `true` when every controller succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot start or its output cannot be rendered.
    pub async fn run(self) -> Result<bool> {
        let Cli {
            json,
            quiet,
            no_color,
            config,
            yes,
            command,
            ..
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes, config },
        });

        match command {
            Command::Ping(target) => commands::execute(&app, &target, Ping).await,
            Command::ShowController(target) => {
                commands::execute(&app, &target, ShowController).await
            }
            Command::Status(target) => {
                let status = Status {
                    models: target.models.clone(),
                };
                commands::execute(&app, &target, status).await
            }
            Command::ListModels { target, refresh } => {
                let list = ListModels {
                    refresh,
                    store: FileCacheStore::new()?,
                    policy: CachePolicy::default(),
                };
                commands::execute(&app, &target, list).await
            }
            Command::AddUser { target, args } => {
                let add = args.into_command(target.models.clone());
                commands::execute(&app, &target, add).await
            }
            Command::RemoveUser { target, args } => {
                let remove = args.remove(target.models.clone());
                commands::execute(&app, &target, remove).await
            }
            Command::EnableUser { target, args } => {
                commands::execute(&app, &target, args.enable()).await
            }
            Command::DisableUser { target, args } => {
                commands::execute(&app, &target, args.disable()).await
            }
            Command::Grant { target, args } => {
                let grant = args.into_command(target.models.clone());
                commands::execute(&app, &target, grant).await
            }
            Command::Revoke { target, args } => {
                let revoke = args.into_command(target.models.clone());
                commands::execute(&app, &target, revoke).await
            }
            Command::UpdatePackages { target, args } => {
                let update = args.into_command(target.models.clone())?;
                commands::execute(&app, &target, update).await
            }
            Command::Config { target, args } => {
                let config = args.into_command(target.models.clone())?;
                commands::execute(&app, &target, config).await
            }
        }
    }
}
