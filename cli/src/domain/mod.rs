//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod acl;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod packages;
pub mod result;
pub mod run;
pub mod target;

pub use acl::Acl;
pub use cache::{CacheEntry, CachePolicy, cache_key};
pub use config::{ConnectionSettings, SpellConfig, parse_config};
pub use error::{CacheError, SpellError};
pub use filter::{ModelInfo, ModelSelector, TargetFilter};
pub use result::{CommandResult, ResultRecord, merge_result, sort_records_by_target};
pub use run::{RunOptions, RunType};
pub use target::{PortRange, TargetConfig, TargetContext, TunnelSpec};
