//! Domain types and validators for Spell configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access. The infra
//! layer reads the YAML documents and hands the raw values to [`parse_config`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::domain::error::SpellError;
use crate::domain::target::{PortRange, TargetConfig, validate_target};

// ── Constants ────────────────────────────────────────────────────────────────

/// Top-level key holding per-collection defaults (`default.controller`).
pub const DEFAULT_KEY: &str = "default";

/// Top-level key holding the controller list.
pub const CONTROLLERS_KEY: &str = "controllers";

// ── Config schema ────────────────────────────────────────────────────────────

/// Validated configuration: the controllers a run may target.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpellConfig {
    #[serde(default)]
    pub controllers: Vec<TargetConfig>,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Connection settings shared by every controller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionSettings {
    /// Local port range for tunnels when a controller does not set its own.
    #[serde(default, alias = "port-range")]
    pub port_range: Option<PortRange>,
}

// ── Merging ──────────────────────────────────────────────────────────────────

/// Merges the personal config over the global one.
///
/// `default.*` blocks are merged key by key (personal wins), controllers are
/// merged by `uuid` (personal fields override, new controllers are appended)
/// and any other top-level key is replaced by the personal value.
#[must_use]
pub fn merge_configs(global: Value, personal: Value) -> Value {
    let (Value::Mapping(mut merged), Value::Mapping(personal)) = (global, personal) else {
        return Value::Null;
    };

    for (key, value) in personal {
        match (key.as_str(), merged.get_mut(&key)) {
            (Some(DEFAULT_KEY), Some(Value::Mapping(existing))) => {
                if let Value::Mapping(personal_defaults) = value {
                    for (section, section_value) in personal_defaults {
                        match (existing.get_mut(&section), section_value) {
                            (Some(Value::Mapping(base)), Value::Mapping(over)) => {
                                base.extend(over);
                            }
                            (_, over) => {
                                existing.insert(section, over);
                            }
                        }
                    }
                }
            }
            (Some(CONTROLLERS_KEY), Some(Value::Sequence(existing))) => {
                if let Value::Sequence(personal_controllers) = value {
                    merge_by_uuid(existing, personal_controllers);
                }
            }
            _ => {
                merged.insert(key, value);
            }
        }
    }
    Value::Mapping(merged)
}

fn merge_by_uuid(base: &mut Vec<Value>, overrides: Vec<Value>) {
    for item in overrides {
        let uuid = item.get("uuid").cloned();
        let slot = uuid
            .as_ref()
            .and_then(|id| base.iter_mut().find(|b| b.get("uuid") == Some(id)));
        match (slot, item) {
            (Some(Value::Mapping(existing)), Value::Mapping(over)) => existing.extend(over),
            (_, item) => base.push(item),
        }
    }
}

/// Applies `default.<kind>` to every entry of `<kind>s`, without overwriting
/// values the entry already sets. The `default` block is removed.
#[must_use]
pub fn apply_defaults(source: Value) -> Value {
    let Value::Mapping(mut root) = source else {
        return source;
    };
    let Some(Value::Mapping(defaults)) = root.remove(DEFAULT_KEY) else {
        return Value::Mapping(root);
    };

    for (kind, default_value) in defaults {
        let (Some(kind), Value::Mapping(default_map)) = (kind.as_str(), default_value) else {
            continue;
        };
        let collection_key = format!("{kind}s");
        if let Some(Value::Sequence(entries)) = root.get_mut(collection_key.as_str()) {
            for entry in entries.iter_mut() {
                if let Value::Mapping(entry_map) = entry {
                    fill_missing(entry_map, &default_map);
                }
            }
        }
    }
    Value::Mapping(root)
}

fn fill_missing(target: &mut Mapping, defaults: &Mapping) {
    for (key, default_value) in defaults {
        match (target.get_mut(key), default_value) {
            (None | Some(Value::Null), value) => {
                target.insert(key.clone(), value.clone());
            }
            (Some(Value::Mapping(nested)), Value::Mapping(nested_defaults)) => {
                fill_missing(nested, nested_defaults);
            }
            _ => {}
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Merges, applies defaults, deserializes and validates a configuration.
///
/// # Errors
///
/// Returns [`SpellError::Configuration`] if the document does not match the
/// schema, a controller fails validation, or two controllers share a name.
pub fn parse_config(global: Value, personal: Option<Value>) -> Result<SpellConfig, SpellError> {
    let source = match personal {
        Some(personal) if !personal.is_null() => merge_configs(global, personal),
        _ => global,
    };
    let source = apply_defaults(source);

    let config: SpellConfig = serde_yaml::from_value(source).map_err(|e| {
        SpellError::Configuration(format!("configuration file validation failed: {e}"))
    })?;

    let mut names = HashSet::new();
    for controller in &config.controllers {
        validate_target(controller)?;
        if !names.insert(controller.name.as_str()) {
            return Err(SpellError::Configuration(format!(
                "duplicate controller name '{}'",
                controller.name
            )));
        }
    }
    Ok(config)
}

// ── Unit tests ───────────────────────────────────────────────────────────────
