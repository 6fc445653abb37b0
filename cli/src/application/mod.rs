//! Application layer: port trait definitions, connection handling, command
//! dispatch and the concrete commands.
//!
//! This module depends only on `crate::domain`, never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod command;
pub mod connection;
pub mod filter;
pub mod ports;
pub mod runner;
pub mod spells;

pub use command::{CommandContext, DryRun, SpellCommand, run_command};
pub use connection::{ConnectOptions, ConnectionManager};
pub use ports::{
    CacheStore, CommandRunner, ConfigStore, ControllerApi, ControllerDialer, NetworkProbe,
    TunnelLauncher, TunnelProcess,
};
pub use runner::Runner;
