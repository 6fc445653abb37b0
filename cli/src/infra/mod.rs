//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! `juju` client, ssh tunnels, port probing, and the config and cache files.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod cache;
pub mod command_runner;
pub mod config;
pub mod juju;
pub mod network;
pub mod tunnel;
