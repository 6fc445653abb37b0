//! Read-only controller and model queries.

use std::pin::pin;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tracing::debug;

use crate::application::command::{CommandContext, SpellCommand, ok};
use crate::application::filter::filter_models;
use crate::application::ports::ControllerApi;
use crate::application::spells::selector;
use crate::domain::result::CommandResult;

/// Controller information document.
pub struct ShowController;

impl SpellCommand for ShowController {
    fn name(&self) -> &'static str {
        "show_controller"
    }

    fn summary(&self) -> String {
        "show controller information".to_string()
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let info = ctx.controller.info().await?;
        debug!(controller = %ctx.target.name, "controller info fetched");
        ok(info)
    }
}

/// Status of the selected models, keyed by `owner/name`.
pub struct Status {
    pub models: Vec<String>,
}

impl SpellCommand for Status {
    fn name(&self) -> &'static str {
        "status"
    }

    fn summary(&self) -> String {
        "show status of the selected models".to_string()
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        let mut output = Map::new();
        while let Some(selected) = models.next().await {
            let (label, model) = selected?;
            let status = ctx.controller.model_status(&model).await?;
            debug!(
                controller = %ctx.target.name,
                label = %label,
                model = %model.name,
                "model status fetched"
            );
            output.insert(model.qualified_name(), status);
        }
        ok(Value::Object(output))
    }
}
