//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{Acl, CacheEntry, CacheError, ModelInfo, TargetConfig, TunnelSpec};

// ── Value Types ───────────────────────────────────────────────────────────────

/// A controller user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub display_name: String,
    pub disabled: bool,
}

/// Application name → unit names of a model.
pub type ApplicationUnits = BTreeMap<String, Vec<String>>;

// ── Controller Ports ──────────────────────────────────────────────────────────

/// A live, authenticated session with one controller.
///
/// Model-scoped calls take the [`ModelInfo`] returned by `list_models`.
#[allow(async_fn_in_trait)]
pub trait ControllerApi {
    /// Whether the session is still usable.
    async fn is_connected(&self) -> bool;
    /// Close the session. Calling it twice is not an error.
    async fn disconnect(&self) -> Result<()>;

    /// Controller information document.
    async fn info(&self) -> Result<Value>;
    /// Every model the session can see.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
    /// Full status document of a model.
    async fn model_status(&self, model: &ModelInfo) -> Result<Value>;
    /// Applications of a model with their units.
    async fn model_applications(&self, model: &ModelInfo) -> Result<ApplicationUnits>;
    /// Run a shell command on a unit and return its stdout.
    async fn run_on_unit(
        &self,
        model: &ModelInfo,
        unit: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String>;
    /// Configuration of an application, `None` if the model has no such application.
    async fn get_app_config(&self, model: &ModelInfo, application: &str) -> Result<Option<Value>>;
    async fn set_app_config(
        &self,
        model: &ModelInfo,
        application: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Look a user up, `None` if the user does not exist.
    async fn get_user(&self, username: &str) -> Result<Option<UserInfo>>;
    async fn add_user(
        &self,
        username: &str,
        display_name: Option<&str>,
        password: &str,
    ) -> Result<UserInfo>;
    async fn set_password(&self, username: &str, password: &str) -> Result<()>;
    /// Returns `false` if the controller refused the change.
    async fn enable_user(&self, username: &str) -> Result<bool>;
    /// Returns `false` if the controller refused the change.
    async fn disable_user(&self, username: &str) -> Result<bool>;
    /// Grant a controller access level; `false` if the controller refused.
    async fn grant(&self, username: &str, acl: Acl) -> Result<bool>;
    /// Grant a model access level; `false` if the controller refused.
    async fn grant_model(&self, username: &str, model: &ModelInfo, acl: Acl) -> Result<bool>;
    async fn revoke(&self, username: &str, acl: Acl) -> Result<()>;
    async fn revoke_model(&self, username: &str, model: &ModelInfo, acl: Acl) -> Result<()>;
}

/// Opens controller sessions.
#[allow(async_fn_in_trait)]
pub trait ControllerDialer {
    type Handle: ControllerApi;

    /// Log in to `target` through `endpoint` (which may be a local tunnel end).
    async fn dial(&self, target: &TargetConfig, endpoint: &str) -> Result<Self::Handle>;
}

// ── Tunnel Ports ──────────────────────────────────────────────────────────────

/// A running tunnel subprocess.
#[allow(async_fn_in_trait)]
pub trait TunnelProcess {
    /// `false` once the subprocess has exited.
    fn is_running(&mut self) -> bool;
    /// Stop the subprocess and reap it.
    async fn terminate(&mut self) -> Result<()>;
}

/// Spawns tunnel subprocesses.
#[allow(async_fn_in_trait)]
pub trait TunnelLauncher {
    type Tunnel: TunnelProcess;

    /// Forward `localhost:<local_port>` to `endpoint` through the tunnel destination.
    async fn port_forward(
        &self,
        spec: &TunnelSpec,
        local_port: u16,
        endpoint: &str,
    ) -> Result<Self::Tunnel>;
    /// Route the tunnel subnets through its destination.
    async fn subnet_tunnel(&self, spec: &TunnelSpec) -> Result<Self::Tunnel>;
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Abstracts network connectivity checks so application services can be tested
/// without real network access.
#[allow(async_fn_in_trait)]
pub trait NetworkProbe {
    /// Check TCP connectivity to the given host and port.
    async fn check_tcp_connectivity(&self, host: &str, port: u16) -> Result<bool>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// A runner whose children also get `key=value` in their environment.
    #[must_use]
    fn with_env(&self, key: &str, value: &OsStr) -> Self
    where
        Self: Sized;
    /// Spawn a long-running program without waiting for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Storage Ports ─────────────────────────────────────────────────────────────

/// Local persistence of command output. Sync trait; entries are small.
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore {
    /// Load the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] when nothing is stored, [`CacheError::PermissionDenied`]
    /// when the file is unreadable, [`CacheError::Io`] for anything else.
    fn load(&self, key: &str) -> Result<CacheEntry, CacheError>;
    /// Store `entry` under `key`, replacing any previous entry atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the cache directory or file cannot be written.
    fn commit(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Raw configuration documents: the global one and an optional personal overlay.
pub trait ConfigStore {
    /// Load both documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the global file is missing or either file is not YAML.
    fn load_sources(&self) -> Result<(serde_yaml::Value, Option<serde_yaml::Value>)>;
    /// Path of the global configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    fn path(&self) -> Result<PathBuf>;
}
