//! User management: add, remove, enable, disable, grant and revoke.

use std::pin::pin;

use futures_util::StreamExt;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use tracing::{info, warn};

use crate::application::command::{
    CommandContext, SpellCommand, ensure_connected, ok, run_command, run_step,
};
use crate::application::filter::filter_models;
use crate::application::ports::ControllerApi;
use crate::application::spells::selector;
use crate::domain::acl::Acl;
use crate::domain::error::SpellError;
use crate::domain::filter::ModelInfo;
use crate::domain::result::CommandResult;

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LEN: usize = 40;

#[must_use]
pub fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Rejects commands that would act on the account the tool itself logs in with.
async fn reject_self<C: ControllerApi>(
    ctx: CommandContext<'_, C>,
    user: &str,
    message: &str,
) -> Option<CommandResult> {
    if user == ctx.target.user {
        return Some(CommandResult::rejected(message));
    }
    ensure_connected(ctx).await
}

// ── Enable / disable ─────────────────────────────────────────────────────────

pub struct EnableUser {
    pub user: String,
}

impl SpellCommand for EnableUser {
    fn name(&self) -> &'static str {
        "enable_user"
    }

    fn summary(&self) -> String {
        format!("enable user '{}'", self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        if !ctx.controller.enable_user(&self.user).await? {
            return Err(SpellError::RemoteOperation(format!(
                "enable user {} on controller {} failed",
                self.user, ctx.target.uuid
            ))
            .into());
        }
        ok(json!(true))
    }
}

pub struct DisableUser {
    pub user: String,
}

impl SpellCommand for DisableUser {
    fn name(&self) -> &'static str {
        "disable_user"
    }

    fn summary(&self) -> String {
        format!("disable user '{}'", self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        if !ctx.controller.disable_user(&self.user).await? {
            return Err(SpellError::RemoteOperation(format!(
                "disable user {} on controller {} failed",
                self.user, ctx.target.uuid
            ))
            .into());
        }
        ok(json!(true))
    }
}

// ── Grant / revoke ───────────────────────────────────────────────────────────

/// Grants the controller part of `acl` and the model part on every selected model.
pub struct Grant {
    pub user: String,
    pub acl: Acl,
    pub models: Vec<String>,
}

impl SpellCommand for Grant {
    fn name(&self) -> &'static str {
        "grant"
    }

    fn summary(&self) -> String {
        format!("grant '{}' to user '{}'", self.acl, self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let (controller_acl, model_acl) = self.acl.split();
        if !ctx.controller.grant(&self.user, controller_acl).await? {
            return Err(SpellError::RemoteOperation(format!(
                "grant {controller_acl} to user {} was refused",
                self.user
            ))
            .into());
        }

        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        while let Some(selected) = models.next().await {
            let (_, model) = selected?;
            if !ctx.controller.grant_model(&self.user, &model, model_acl).await? {
                return Err(SpellError::RemoteOperation(format!(
                    "grant {model_acl} on model {} to user {} was refused",
                    model.name, self.user
                ))
                .into());
            }
        }
        info!(controller = %ctx.target.name, user = %self.user, acl = %self.acl, "access granted");
        ok(json!(true))
    }
}

/// Revokes a controller level, or a model level on every selected model.
pub struct Revoke {
    pub user: String,
    pub acl: Acl,
    pub models: Vec<String>,
}

impl SpellCommand for Revoke {
    fn name(&self) -> &'static str {
        "revoke"
    }

    fn summary(&self) -> String {
        format!("revoke '{}' from user '{}'", self.acl, self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        if self.acl.is_controller_acl() {
            ctx.controller.revoke(&self.user, self.acl).await?;
            return ok(json!(true));
        }
        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        while let Some(selected) = models.next().await {
            let (_, model) = selected?;
            ctx.controller
                .revoke_model(&self.user, &model, self.acl)
                .await?;
        }
        ok(json!(true))
    }
}

/// Revokes one access level on one model.
pub struct RevokeModel {
    pub user: String,
    pub model: ModelInfo,
    pub acl: Acl,
}

impl SpellCommand for RevokeModel {
    fn name(&self) -> &'static str {
        "revoke_model"
    }

    fn summary(&self) -> String {
        format!(
            "revoke '{}' on model '{}' from user '{}'",
            self.acl, self.model.name, self.user
        )
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        ctx.controller
            .revoke_model(&self.user, &self.model, self.acl)
            .await?;
        ok(json!(true))
    }
}

// ── Add / remove ─────────────────────────────────────────────────────────────

/// Creates a user, enables it and optionally grants access.
///
/// An existing user is an error unless `overwrite` is set, in which case its
/// password is reset. With `overwrite`, failed enable/grant steps are logged
/// and skipped.
pub struct AddUser {
    pub user: String,
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub acl: Option<Acl>,
    pub overwrite: bool,
    pub models: Vec<String>,
}

impl SpellCommand for AddUser {
    fn name(&self) -> &'static str {
        "add_user"
    }

    fn summary(&self) -> String {
        format!("add user '{}'", self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn pre_check<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> Option<CommandResult> {
        reject_self(ctx, &self.user, "User can't add self").await
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let password = self
            .password
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(random_password);

        let user = match ctx.controller.get_user(&self.user).await? {
            None => {
                let created = ctx
                    .controller
                    .add_user(&self.user, self.display_name.as_deref(), &password)
                    .await?;
                info!(controller = %ctx.target.name, user = %self.user, "user created");
                created
            }
            Some(existing) if self.overwrite => {
                ctx.controller.set_password(&self.user, &password).await?;
                info!(controller = %ctx.target.name, user = %self.user, "user password reset");
                existing
            }
            Some(_) => {
                return Ok(CommandResult::failed(SpellError::RemoteOperation(format!(
                    "user '{}' already exists",
                    self.user
                ))));
            }
        };

        let enable = EnableUser {
            user: self.user.clone(),
        };
        if let Some(failed) = run_step(&enable, ctx, self.overwrite).await {
            return Ok(failed);
        }

        if let Some(acl) = self.acl {
            let grant = Grant {
                user: self.user.clone(),
                acl,
                models: self.models.clone(),
            };
            if let Some(failed) = run_step(&grant, ctx, self.overwrite).await {
                return Ok(failed);
            }
        }

        ok(json!({
            "user": user.username,
            "display_name": user.display_name,
            "password": password,
        }))
    }
}

/// Revokes a user's access everywhere and disables it. Failed steps are logged.
pub struct RemoveUser {
    pub user: String,
    pub models: Vec<String>,
}

impl SpellCommand for RemoveUser {
    fn name(&self) -> &'static str {
        "remove_user"
    }

    fn summary(&self) -> String {
        format!("remove user '{}'", self.user)
    }

    fn is_mutating(&self) -> bool {
        true
    }

    async fn pre_check<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> Option<CommandResult> {
        reject_self(ctx, &self.user, "User can't remove self").await
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let controller = ctx.target.name.as_str();

        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        while let Some(selected) = models.next().await {
            let (_, model) = selected?;
            let revoke_model = RevokeModel {
                user: self.user.clone(),
                model,
                acl: Acl::Read,
            };
            let result = run_command(&revoke_model, ctx).await;
            if !result.success {
                warn!(
                    controller,
                    model = %revoke_model.model.name,
                    user = %self.user,
                    error = ?result.error.map(|e| e.to_string()),
                    "revoking model access failed"
                );
            }
        }

        let revoke = Revoke {
            user: self.user.clone(),
            acl: Acl::Login,
            models: Vec::new(),
        };
        let result = run_command(&revoke, ctx).await;
        if !result.success {
            warn!(
                controller,
                user = %self.user,
                error = ?result.error.map(|e| e.to_string()),
                "revoking login failed"
            );
        }

        let disable = DisableUser {
            user: self.user.clone(),
        };
        let result = run_command(&disable, ctx).await;
        if !result.success {
            warn!(
                controller,
                user = %self.user,
                error = ?result.error.map(|e| e.to_string()),
                "disabling user failed"
            );
        }

        info!(controller, user = %self.user, "user removed");
        ok(json!(true))
    }
}
