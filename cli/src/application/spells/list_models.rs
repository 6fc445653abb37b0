//! Model listing served from the local cache.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::application::command::{CommandContext, SpellCommand, ok};
use crate::application::filter::selected_models;
use crate::application::ports::{CacheStore, ControllerApi};
use crate::domain::cache::{CacheEntry, CachePolicy, cache_key};
use crate::domain::error::CacheError;
use crate::domain::filter::ModelSelector;
use crate::domain::result::CommandResult;

/// Lists models, reading the cache unless it is stale or `refresh` is set.
///
/// Cache failures are logged and never fail the command.
pub struct ListModels<S> {
    pub refresh: bool,
    pub store: S,
    pub policy: CachePolicy,
}

impl<S: CacheStore> ListModels<S> {
    fn load(&self, key: &str, controller: &str) -> Option<CacheEntry> {
        match self.store.load(key) {
            Ok(mut entry) => {
                if let Some(data) = entry.data.as_object_mut() {
                    data.insert("refresh".to_string(), json!(false));
                }
                debug!(controller, key, "loaded models from cache");
                Some(entry)
            }
            Err(CacheError::NotFound(_)) => {
                debug!(controller, key, "no cached models");
                None
            }
            Err(e) => {
                warn!(controller, error = %e, "failed to load cache");
                None
            }
        }
    }
}

impl<S: CacheStore> SpellCommand for ListModels<S> {
    fn name(&self) -> &'static str {
        "list_models"
    }

    fn summary(&self) -> String {
        if self.refresh {
            "list models from the controller and refresh the cache".to_string()
        } else {
            "list models from the cache or the controller".to_string()
        }
    }

    async fn execute<C: ControllerApi>(
        &self,
        ctx: CommandContext<'_, C>,
    ) -> anyhow::Result<CommandResult> {
        let uuid = ctx.target.uuid.to_string();
        let key = cache_key(self.name(), &uuid);
        let name = ctx.target.name.as_str();

        let cached = if self.refresh {
            None
        } else {
            self.load(&key, name)
        };

        let entry = match cached {
            Some(entry) if !self.policy.needs_refresh(Some(&entry), false, Utc::now()) => entry,
            _ => {
                let models: Vec<String> = selected_models(ctx.controller, &ModelSelector::All)
                    .await?
                    .into_iter()
                    .map(|(_, model)| model.qualified_name())
                    .collect();
                let entry = CacheEntry::new(
                    uuid,
                    name,
                    json!({ "models": models, "refresh": self.refresh }),
                    self.policy.ttl,
                );
                match self.store.commit(&key, &entry) {
                    Ok(()) => debug!(controller = name, key = %key, "saved models to cache"),
                    Err(e) => warn!(controller = name, error = %e, "failed to save cache"),
                }
                entry
            }
        };
        ok(entry.context())
    }
}
