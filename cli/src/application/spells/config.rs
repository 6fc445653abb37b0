//! Application configuration get/set.

use std::collections::BTreeMap;
use std::pin::pin;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::application::command::{CommandContext, SpellCommand, ok};
use crate::application::filter::filter_models;
use crate::application::ports::ControllerApi;
use crate::application::spells::selector;
use crate::domain::filter::ModelInfo;
use crate::domain::result::CommandResult;

/// One entry of a config file: settings applied to one application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationConfig {
    pub application: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Read and optionally change a single application.
    App {
        application: String,
        get: Option<String>,
        set: BTreeMap<String, String>,
    },
    /// Apply every entry of a config file.
    File(Vec<ApplicationConfig>),
}

/// Gets or sets application config on every selected model, keyed by `owner/name`.
pub struct Config {
    pub models: Vec<String>,
    pub action: ConfigAction,
}

impl Config {
    async fn apply_app<C: ControllerApi>(
        ctx: CommandContext<'_, C>,
        model: &ModelInfo,
        application: &str,
        get: Option<&str>,
        set: &BTreeMap<String, String>,
    ) -> anyhow::Result<Option<Value>> {
        if ctx.controller.get_app_config(model, application).await?.is_none() {
            debug!(controller = %ctx.target.name, model = %model.name, application, "application not in model");
            return Ok(None);
        }
        if !set.is_empty() {
            ctx.controller.set_app_config(model, application, set).await?;
            info!(
                controller = %ctx.target.name,
                model = %model.name,
                application,
                keys = set.len(),
                "application config set"
            );
        }
        let config = ctx
            .controller
            .get_app_config(model, application)
            .await?
            .unwrap_or_else(|| json!({}));
        Ok(Some(match get {
            Some(key) => json!({ key: config.get(key).cloned().unwrap_or(Value::Null) }),
            None => config,
        }))
    }

    async fn apply_file<C: ControllerApi>(
        ctx: CommandContext<'_, C>,
        model: &ModelInfo,
        entries: &[ApplicationConfig],
    ) -> anyhow::Result<Value> {
        let mut output = Map::new();
        for entry in entries {
            if let Some(value) =
                Self::apply_app(ctx, model, &entry.application, None, &entry.config).await?
            {
                output.insert(entry.application.clone(), value);
            }
        }
        Ok(Value::Object(output))
    }
}

impl SpellCommand for Config {
    fn name(&self) -> &'static str {
        "config"
    }

    fn summary(&self) -> String {
        match &self.action {
            ConfigAction::App {
                application, set, ..
            } if set.is_empty() => format!("show config of application '{application}'"),
            ConfigAction::App { application, .. } => {
                format!("set config of application '{application}'")
            }
            ConfigAction::File(entries) => {
                format!("apply config to {} application(s)", entries.len())
            }
        }
    }

    fn is_mutating(&self) -> bool {
        match &self.action {
            ConfigAction::App { set, .. } => !set.is_empty(),
            ConfigAction::File(_) => true,
        }
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let selector = selector(&self.models, ctx.target);
        let mut models = pin!(filter_models(ctx.controller, &selector));
        let mut output = Map::new();
        while let Some(selected) = models.next().await {
            let (_, model) = selected?;
            let value = match &self.action {
                ConfigAction::App {
                    application,
                    get,
                    set,
                } => Self::apply_app(ctx, &model, application, get.as_deref(), set)
                    .await?
                    .unwrap_or_else(|| json!({})),
                ConfigAction::File(entries) => Self::apply_file(ctx, &model, entries).await?,
            };
            output.insert(model.qualified_name(), value);
        }
        ok(Value::Object(output))
    }
}
