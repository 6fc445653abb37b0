//! Uniform command result and the per-target record built from it.

use serde::Serialize;
use serde_json::Value;

use crate::domain::error::{SpellError, serialize_error};
use crate::domain::target::{TargetConfig, TargetContext};

/// Outcome of one command on one target. `error` is set iff `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub output: Option<Value>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SpellError>,
}

impl CommandResult {
    #[must_use]
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: SpellError) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
        }
    }

    /// A failure that still carries the output produced before it.
    #[must_use]
    pub fn partial(output: Value, error: SpellError) -> Self {
        Self {
            success: false,
            output: Some(output),
            error: Some(error),
        }
    }

    /// Pre-check rejection: a failure carrying a plain message.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failed(SpellError::RemoteOperation(reason.into()))
    }
}

/// A [`CommandResult`] tagged with the identity of the target that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub context: TargetContext,
    pub success: bool,
    pub output: Option<Value>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SpellError>,
}

/// Combines a target's identity with a command result.
#[must_use]
pub fn merge_result(target: &TargetConfig, result: CommandResult) -> ResultRecord {
    ResultRecord {
        context: target.context(),
        success: result.success,
        output: result.output,
        error: result.error,
    }
}

/// Sorts records by target name, e.g. after a parallel run.
pub fn sort_records_by_target(records: &mut [ResultRecord]) {
    records.sort_by(|a, b| a.context.name.cmp(&b.context.name));
}

/// `true` when every record succeeded.
#[must_use]
pub fn all_succeeded(records: &[ResultRecord]) -> bool {
    records.iter().all(|r| r.success)
}
