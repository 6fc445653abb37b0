//! Access levels accepted by `grant` and `revoke`.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::SpellError;

/// Access level of a user on a controller or a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Acl {
    Login,
    AddModel,
    Superuser,
    Read,
    Write,
    Admin,
}

impl Acl {
    pub const ALL: [Self; 6] = [
        Self::Login,
        Self::AddModel,
        Self::Superuser,
        Self::Read,
        Self::Write,
        Self::Admin,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::AddModel => "add-model",
            Self::Superuser => "superuser",
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn is_controller_acl(self) -> bool {
        matches!(self, Self::Login | Self::AddModel | Self::Superuser)
    }

    /// Splits a requested access level into `(controller, model)` levels.
    ///
    /// Model levels imply `login` on the controller; `superuser` implies
    /// `admin` on every model and other controller levels imply `read`.
    #[must_use]
    pub fn split(self) -> (Self, Self) {
        let controller = if self.is_controller_acl() {
            self
        } else {
            Self::Login
        };
        let model = match self {
            Self::Read | Self::Write | Self::Admin => self,
            Self::Superuser => Self::Admin,
            Self::Login | Self::AddModel => Self::Read,
        };
        (controller, model)
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = SpellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|acl| acl.as_str() == s)
            .ok_or_else(|| {
                let choices: Vec<_> = Self::ALL.iter().map(|a| a.as_str()).collect();
                SpellError::Configuration(format!(
                    "unknown acl '{s}' (expected one of: {})",
                    choices.join(", ")
                ))
            })
    }
}
