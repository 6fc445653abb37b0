//! Package updates driven by a patch file.

use std::pin::pin;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::application::command::{CommandContext, SpellCommand, ok};
use crate::application::filter::filter_models;
use crate::application::ports::ControllerApi;
use crate::application::spells::selector;
use crate::domain::packages::{PatchFile, complete_unit, plan_updates};
use crate::domain::result::CommandResult;

/// Time allowed for apt on a single unit.
pub const UNIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Recorded for units not reached before the target deadline.
pub const UNIT_NOT_RUN: &str = "not run: target timeout reached";
/// Recorded for the unit whose apt run the target deadline cut short.
pub const UNIT_INTERRUPTED: &str = "interrupted: target timeout reached";

/// Runs apt on every unit of the applications matched by the patch file.
///
/// A unit whose command fails is recorded with `success = false`; the
/// remaining units are still updated. When the target deadline passes, the
/// units already processed are returned with a timeout error.
pub struct UpdatePackages {
    pub patch: PatchFile,
    pub models: Vec<String>,
}

impl UpdatePackages {
    async fn make_updates<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
        dry_run: bool,
    ) -> anyhow::Result<CommandResult> {
        let controller = ctx.target.name.as_str();
        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        let mut output = Map::new();
        let mut timed_out = false;

        while !timed_out {
            let Some(next) = ctx.within(models.next()).await else {
                timed_out = true;
                break;
            };
            let Some(selected) = next else { break };
            let (label, model) = selected?;
            let Some(applications) = ctx.within(ctx.controller.model_applications(&model)).await
            else {
                timed_out = true;
                break;
            };
            let mut plan = plan_updates(&self.patch, &applications?, dry_run)?;

            for outcome in &mut plan {
                let expected = outcome.patch.packages_to_update.clone();
                for app in &mut outcome.results {
                    for unit in &mut app.units {
                        if timed_out {
                            unit.raw_output = UNIT_NOT_RUN.to_string();
                            unit.success = false;
                            continue;
                        }
                        debug!(controller, model = %model.name, unit = %unit.unit, "running apt");
                        let run = ctx.controller.run_on_unit(
                            &model,
                            &unit.unit,
                            &unit.command,
                            ctx.budget(UNIT_COMMAND_TIMEOUT),
                        );
                        match ctx.within(run).await {
                            Some(Ok(stdout)) => complete_unit(unit, &expected, stdout),
                            Some(Err(e)) => {
                                warn!(
                                    controller,
                                    model = %model.name,
                                    unit = %unit.unit,
                                    error = %format!("{e:#}"),
                                    "package update failed on unit"
                                );
                                unit.raw_output = format!("{e:#}");
                                unit.success = false;
                            }
                            None => {
                                warn!(controller, unit = %unit.unit, "target timeout reached during apt");
                                unit.raw_output = UNIT_INTERRUPTED.to_string();
                                unit.success = false;
                                timed_out = true;
                            }
                        }
                    }
                }
            }

            info!(controller, label = %label, model = %model.name, dry_run, "packages processed");
            output.insert(model.qualified_name(), serde_json::to_value(&plan)?);
        }

        if timed_out {
            return Ok(CommandResult::partial(
                Value::Object(output),
                ctx.timeout_error(),
            ));
        }
        ok(Value::Object(output))
    }
}

impl SpellCommand for UpdatePackages {
    fn name(&self) -> &'static str {
        "update_packages"
    }

    fn summary(&self) -> String {
        format!(
            "update packages of {} application pattern(s)",
            self.patch.applications.len()
        )
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn observes_deadline(&self) -> bool {
        true
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        self.make_updates(ctx, false).await
    }

    /// apt's own simulation mode; nothing is installed.
    async fn dry_run<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        self.make_updates(ctx, true).await
    }
}
