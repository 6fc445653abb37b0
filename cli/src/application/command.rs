//! The command protocol every spell implements.

use std::future::Future;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::ports::ControllerApi;
use crate::domain::error::SpellError;
use crate::domain::result::CommandResult;
use crate::domain::target::TargetConfig;

/// The point by which one target's run has to be over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    /// The whole budget, as requested.
    pub limit: Duration,
}

impl Deadline {
    #[must_use]
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// What a command sees while it runs against one target.
pub struct CommandContext<'a, C> {
    pub controller: &'a C,
    pub target: &'a TargetConfig,
    /// Unset when the caller imposes no time limit.
    pub deadline: Option<Deadline>,
}

impl<C> CommandContext<'_, C> {
    /// Awaits `work` until the deadline; `None` once the deadline has passed.
    pub async fn within<F: Future>(&self, work: F) -> Option<F::Output> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, work).await.ok(),
            None => Some(work.await),
        }
    }

    /// Time a single step may take: `cap`, or less if the deadline is closer.
    #[must_use]
    pub fn budget(&self, cap: Duration) -> Duration {
        self.deadline.map_or(cap, |d| d.remaining().min(cap))
    }

    /// The error recorded when the deadline cuts a run short.
    #[must_use]
    pub fn timeout_error(&self) -> SpellError {
        SpellError::Timeout {
            target: self.target.name.clone(),
            secs: self.deadline.map_or(0, |d| d.limit.as_secs()),
        }
    }
}

impl<C> Clone for CommandContext<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for CommandContext<'_, C> {}

/// An action run against one connected controller.
///
/// Per-command options are fields of the implementing type.
#[allow(async_fn_in_trait)]
pub trait SpellCommand {
    fn name(&self) -> &'static str;

    /// One-line description used by dry runs.
    fn summary(&self) -> String;

    /// Commands that rewrite host routing cannot share a run with other targets.
    fn needs_subnet_tunnel(&self) -> bool {
        false
    }

    /// Commands that change controller state ask for confirmation first.
    fn is_mutating(&self) -> bool {
        false
    }

    /// Commands that stop at [`CommandContext::deadline`] themselves and
    /// return what they finished. The runner gives them a short grace period
    /// before cutting them off.
    fn observes_deadline(&self) -> bool {
        false
    }

    /// Short-circuits execution with a result when the command must not run.
    async fn pre_check<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> Option<CommandResult> {
        ensure_connected(ctx).await
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult>;

    /// Describes what would run without calling the controller.
    async fn dry_run<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        Ok(CommandResult::ok(json!({
            "target": ctx.target.uuid.to_string(),
            "command": self.name(),
            "summary": self.summary(),
        })))
    }
}

/// Default pre-check: rejects a controller whose session is gone.
pub async fn ensure_connected<C: ControllerApi>(ctx: CommandContext<'_, C>) -> Option<CommandResult> {
    if ctx.controller.is_connected().await {
        None
    } else {
        Some(CommandResult::failed(SpellError::Connection {
            target: ctx.target.name.clone(),
            reason: format!("controller {} is not connected", ctx.target.uuid),
        }))
    }
}

/// Runs `command`'s pre-check and then the command itself.
///
/// Errors never escape: typed [`SpellError`]s are kept, anything else becomes
/// [`SpellError::RemoteOperation`].
pub async fn run_command<S, C>(command: &S, ctx: CommandContext<'_, C>) -> CommandResult
where
    S: SpellCommand,
    C: ControllerApi,
{
    if let Some(rejected) = command.pre_check(ctx).await {
        debug!(controller = %ctx.target.name, command = command.name(), "pre-check rejected command");
        return rejected;
    }
    debug!(controller = %ctx.target.name, command = command.name(), "running command");
    match command.execute(ctx).await {
        Ok(result) => result,
        Err(e) => {
            let error = SpellError::from_anyhow(e);
            warn!(controller = %ctx.target.name, command = command.name(), error = %error, "command failed");
            CommandResult::failed(error)
        }
    }
}

/// Runs a sub-command and decides whether its failure stops the caller.
///
/// Returns `Some(result)` when the caller must return `result` immediately.
pub async fn run_step<S, C>(
    step: &S,
    ctx: CommandContext<'_, C>,
    overwrite: bool,
) -> Option<CommandResult>
where
    S: SpellCommand,
    C: ControllerApi,
{
    let result = run_command(step, ctx).await;
    if result.success {
        return None;
    }
    if overwrite {
        warn!(
            controller = %ctx.target.name,
            step = step.name(),
            error = ?result.error.as_ref().map(ToString::to_string),
            "step failed, continuing because overwrite is set"
        );
        None
    } else {
        Some(result)
    }
}

/// Runs the wrapped command's dry-run instead of the command.
pub struct DryRun<'a, S>(pub &'a S);

impl<S: SpellCommand> SpellCommand for DryRun<'_, S> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn summary(&self) -> String {
        format!("dry-run: {}", self.0.summary())
    }

    fn needs_subnet_tunnel(&self) -> bool {
        self.0.needs_subnet_tunnel()
    }

    fn observes_deadline(&self) -> bool {
        self.0.observes_deadline()
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        self.0.dry_run(ctx).await
    }
}

/// Wraps a JSON value as a successful result.
pub fn ok(output: Value) -> anyhow::Result<CommandResult> {
    Ok(CommandResult::ok(output))
}
