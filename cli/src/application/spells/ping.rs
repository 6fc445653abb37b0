use serde_json::json;
use tracing::debug;

use crate::application::command::{CommandContext, SpellCommand, ok};
use crate::application::ports::ControllerApi;
use crate::domain::result::CommandResult;

pub const PING_ACCESSIBLE: &str = "accessible";
pub const PING_UNREACHABLE: &str = "unreachable";

/// Reports whether a controller session is usable.
pub struct Ping;

impl SpellCommand for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn summary(&self) -> String {
        "check that the controller is reachable".to_string()
    }

    // an unreachable controller is an answer, not a rejection
    async fn pre_check<C: ControllerApi>(
        &self,
        _ctx: CommandContext<'_, C>,
    ) -> Option<CommandResult> {
        None
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let connected = ctx.controller.is_connected().await;
        debug!(controller = %ctx.target.name, connected, "ping");
        ok(json!(if connected {
            PING_ACCESSIBLE
        } else {
            PING_UNREACHABLE
        }))
    }
}
