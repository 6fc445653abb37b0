//! User management subcommands.

use clap::Args;

use crate::application::spells::{AddUser, DisableUser, EnableUser, Grant, RemoveUser, Revoke};
use crate::domain::acl::Acl;

/// A controller user.
#[derive(Args, Clone, Debug)]
pub struct UserArgs {
    /// User name
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Clone, Debug)]
pub struct AddUserArgs {
    /// User name
    #[arg(long)]
    pub user: String,

    /// Display name
    #[arg(long)]
    pub display_name: Option<String>,

    /// Password; a random one is generated when omitted
    #[arg(long, env = "SPELL_USER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Access to grant after creation (login, add-model, superuser, read, write, admin)
    #[arg(long)]
    pub acl: Option<Acl>,

    /// Reset the password of an existing user and keep going on failed steps
    #[arg(long)]
    pub overwrite: bool,
}

impl AddUserArgs {
    #[must_use]
    pub fn into_command(self, models: Vec<String>) -> AddUser {
        AddUser {
            user: self.user,
            display_name: self.display_name,
            password: self.password,
            acl: self.acl,
            overwrite: self.overwrite,
            models,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct GrantArgs {
    /// User name
    #[arg(long)]
    pub user: String,

    /// Access level (login, add-model, superuser, read, write, admin)
    #[arg(long)]
    pub acl: Acl,
}

impl GrantArgs {
    #[must_use]
    pub fn into_command(self, models: Vec<String>) -> Grant {
        Grant {
            user: self.user,
            acl: self.acl,
            models,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct RevokeArgs {
    /// User name
    #[arg(long)]
    pub user: String,

    /// Access level to revoke
    #[arg(long, default_value = "read")]
    pub acl: Acl,
}

impl RevokeArgs {
    #[must_use]
    pub fn into_command(self, models: Vec<String>) -> Revoke {
        Revoke {
            user: self.user,
            acl: self.acl,
            models,
        }
    }
}

impl UserArgs {
    #[must_use]
    pub fn remove(self, models: Vec<String>) -> RemoveUser {
        RemoveUser {
            user: self.user,
            models,
        }
    }

    #[must_use]
    pub fn enable(self) -> EnableUser {
        EnableUser { user: self.user }
    }

    #[must_use]
    pub fn disable(self) -> DisableUser {
        DisableUser { user: self.user }
    }
}
