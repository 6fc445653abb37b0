//! Target and model selection.
//!
//! Two selectors live here: [`TargetFilter`] picks the controllers of a run from
//! a `key=v1,v2 key2=v3` expression, [`ModelSelector`] picks models on one
//! connected controller from names, patterns or the controller's model mapping.

use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::SpellError;
use crate::domain::target::{ModelMapping, TargetConfig};

// ── Target filter ────────────────────────────────────────────────────────────

/// Conjunction of `field=value[,value…]` clauses over target fields.
///
/// A string field matches when its value is one of the listed values, a list
/// field (e.g. `tags`) matches when it shares at least one value with them.
/// Missing or empty fields never match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    clauses: Vec<(String, BTreeSet<String>)>,
}

impl TargetFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    #[must_use]
    pub fn matches(&self, target: &TargetConfig) -> bool {
        let Ok(Value::Object(fields)) = serde_json::to_value(target) else {
            return false;
        };
        self.clauses.iter().all(|(key, wanted)| match fields.get(key) {
            Some(Value::String(s)) => !s.is_empty() && wanted.contains(s),
            Some(Value::Number(n)) => wanted.contains(&n.to_string()),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|item| wanted.contains(item)),
            _ => false,
        })
    }

    /// Keeps the matching targets.
    ///
    /// # Errors
    ///
    /// Returns [`SpellError::Configuration`] when a non-empty filter matches nothing.
    pub fn apply(&self, targets: Vec<TargetConfig>) -> Result<Vec<TargetConfig>, SpellError> {
        if self.is_empty() {
            return Ok(targets);
        }
        let selected: Vec<_> = targets.into_iter().filter(|t| self.matches(t)).collect();
        if selected.is_empty() {
            return Err(SpellError::Configuration("no controller matches the filter".into()));
        }
        Ok(selected)
    }
}

impl FromStr for TargetFilter {
    type Err = SpellError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let mut clauses = Vec::new();
        for clause in expression.split_whitespace() {
            let bad = || SpellError::Configuration(format!("invalid filter clause '{clause}'"));
            let (key, values) = clause.split_once('=').ok_or_else(bad)?;
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
                return Err(bad());
            }
            let values: BTreeSet<String> = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if values.is_empty() {
                return Err(bad());
            }
            clauses.push((key.to_string(), values));
        }
        Ok(Self { clauses })
    }
}

// ── Model selector ───────────────────────────────────────────────────────────

/// A model as listed by a controller.
///
/// `name` is the short name used for selection; models of different owners
/// can share it, so controller calls address a model by [`ModelInfo::qualified_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ModelInfo {
    /// `owner/name`, or the bare name when the owner is unknown.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Which models of a controller a command acts on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelSelector {
    /// Every model, labelled by its own name.
    #[default]
    All,
    /// Models equal to, or fully matching, one of the entries; labelled by the entry.
    Names(Vec<String>),
    /// Label → patterns; `None` matches every model.
    Mapping(ModelMapping),
}

impl ModelSelector {
    /// Resolves `--models` against a controller's model mapping.
    ///
    /// No names selects every model. A name that is a mapping key expands to
    /// the mapped patterns (an empty list keeps the name itself), any other
    /// name stays literal.
    #[must_use]
    pub fn resolve(cli_models: &[String], mapping: &ModelMapping) -> Self {
        if cli_models.is_empty() {
            return Self::All;
        }
        if !cli_models.iter().any(|m| mapping.contains_key(m)) {
            return Self::Names(cli_models.to_vec());
        }
        let resolved = cli_models
            .iter()
            .map(|name| {
                let patterns = match mapping.get(name) {
                    Some(Some(list)) if list.is_empty() => Some(vec![name.clone()]),
                    Some(mapped) => mapped.clone(),
                    None => Some(vec![name.clone()]),
                };
                (name.clone(), patterns)
            })
            .collect();
        Self::Mapping(resolved)
    }

    /// Applies the selector to a model listing.
    ///
    /// Results are de-duplicated by model uuid; the first label wins.
    ///
    /// # Errors
    ///
    /// Returns [`SpellError::Configuration`] for a pattern that is not a valid regex.
    pub fn select(&self, models: &[ModelInfo]) -> Result<Vec<(String, ModelInfo)>, SpellError> {
        let mut selected = Vec::new();
        match self {
            Self::All => {
                for model in models {
                    selected.push((model.name.clone(), model.clone()));
                }
            }
            Self::Names(names) => {
                for name in names {
                    push_matching(&mut selected, name, Some(std::slice::from_ref(name)), models)?;
                }
            }
            Self::Mapping(mapping) => {
                for (label, patterns) in mapping {
                    push_matching(&mut selected, label, patterns.as_deref(), models)?;
                }
            }
        }

        let mut seen = HashSet::new();
        selected.retain(|(_, model)| seen.insert(model.uuid.clone()));
        Ok(selected)
    }
}

fn push_matching(
    out: &mut Vec<(String, ModelInfo)>,
    label: &str,
    patterns: Option<&[String]>,
    models: &[ModelInfo],
) -> Result<(), SpellError> {
    let Some(patterns) = patterns else {
        out.extend(models.iter().map(|m| (label.to_string(), m.clone())));
        return Ok(());
    };
    for pattern in patterns {
        let re = full_match(pattern)?;
        out.extend(
            models
                .iter()
                .filter(|m| m.name == *pattern || re.is_match(&m.name))
                .map(|m| (label.to_string(), m.clone())),
        );
    }
    Ok(())
}

fn full_match(pattern: &str) -> Result<Regex, SpellError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| SpellError::Configuration(format!("invalid model pattern '{pattern}': {e}")))
}
