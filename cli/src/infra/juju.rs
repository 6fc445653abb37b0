//! Controller client driving the `juju` CLI.
//!
//! Every session gets a private client store (`JUJU_DATA`) holding one
//! controller, `spell-<uuid>`, with the configured endpoint and CA
//! certificate; `juju login` then verifies the controller against that CA.
//! The store is removed when the session is dropped.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tempfile::TempDir;
use tracing::debug;

use crate::application::ports::{
    ApplicationUnits, CommandRunner, ControllerApi, ControllerDialer, UserInfo,
};
use crate::domain::acl::Acl;
use crate::domain::filter::ModelInfo;
use crate::domain::target::TargetConfig;

const JUJU: &str = "juju";

// ── Output parsing ───────────────────────────────────────────────────────────

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_not_found(output: &Output) -> bool {
    let stderr = stderr_of(output).to_lowercase();
    stderr.contains("not found") || stderr.contains("does not exist")
}

fn json_stdout(output: &Output, what: &str) -> Result<Value> {
    serde_json::from_slice(&output.stdout).with_context(|| format!("parsing {what} output"))
}

/// Models of `juju models --format json`.
///
/// `juju models --all` lists models of every owner, so the owner is kept
/// alongside the short name.
///
/// # Errors
///
/// Returns an error if the document has no `models` array.
pub fn parse_models(doc: &Value) -> Result<Vec<ModelInfo>> {
    let models = doc
        .get("models")
        .and_then(Value::as_array)
        .context("models listing has no 'models' array")?;
    Ok(models
        .iter()
        .filter_map(|m| {
            let full = m.get("name").and_then(Value::as_str);
            let (prefix, tail) = match full.map(|full| full.split_once('/')) {
                Some(Some((owner, name))) => (Some(owner), Some(name)),
                _ => (None, full),
            };
            let name = m.get("short-name").and_then(Value::as_str).or(tail)?;
            let owner = m.get("owner").and_then(Value::as_str).or(prefix);
            let uuid = m.get("model-uuid").and_then(Value::as_str)?;
            Some(ModelInfo {
                name: name.to_string(),
                uuid: uuid.to_string(),
                owner: owner.map(ToString::to_string),
            })
        })
        .collect())
}

/// Principal units per application of a `juju status --format json` document.
#[must_use]
pub fn parse_application_units(status: &Value) -> ApplicationUnits {
    let Some(applications) = status.get("applications").and_then(Value::as_object) else {
        return ApplicationUnits::new();
    };
    applications
        .iter()
        .map(|(name, app)| {
            let units = app
                .get("units")
                .and_then(Value::as_object)
                .map(|units| units.keys().cloned().collect())
                .unwrap_or_default();
            (name.clone(), units)
        })
        .collect()
}

/// Flattens `juju config --format json` settings to `{key: value}`.
#[must_use]
pub fn parse_app_config(doc: &Value) -> Value {
    let settings = doc
        .get("settings")
        .and_then(Value::as_object)
        .map(|settings| {
            settings
                .iter()
                .map(|(key, setting)| {
                    let value = setting.get("value").cloned().unwrap_or(Value::Null);
                    (key.clone(), value)
                })
                .collect::<Map<_, _>>()
        })
        .unwrap_or_default();
    Value::Object(settings)
}

/// User of `juju show-user --format json`.
///
/// # Errors
///
/// Returns an error if the document has no `user-name`.
pub fn parse_user(doc: &Value) -> Result<UserInfo> {
    let username = doc
        .get("user-name")
        .and_then(Value::as_str)
        .context("user document has no 'user-name'")?;
    Ok(UserInfo {
        username: username.to_string(),
        display_name: doc
            .get("display-name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        disabled: doc.get("disabled").and_then(Value::as_bool).unwrap_or(false),
    })
}

// ── Client store ─────────────────────────────────────────────────────────────

/// `controllers.yaml` of a client store that knows only `alias`.
///
/// # Errors
///
/// Returns an error if the document cannot be serialised.
pub fn controllers_document(alias: &str, target: &TargetConfig, endpoint: &str) -> Result<String> {
    let doc = json!({
        "controllers": {
            alias: {
                "uuid": target.uuid.to_string(),
                "api-endpoints": [endpoint],
                "ca-cert": target.ca_cert,
            }
        },
        "current-controller": alias,
    });
    serde_yaml::to_string(&doc).context("serialising controllers.yaml")
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting {}", path.display()))?;
    }
    Ok(())
}

/// Creates the private store of one session.
fn client_store(alias: &str, target: &TargetConfig, endpoint: &str) -> Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("spell-juju-")
        .tempdir()
        .context("creating juju client store")?;
    write_private(
        &dir.path().join("controllers.yaml"),
        &controllers_document(alias, target, endpoint)?,
    )?;
    Ok(dir)
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A logged-in session with one controller.
pub struct JujuController<R> {
    runner: R,
    alias: String,
    connected: AtomicBool,
    store: TempDir,
}

impl<R> JujuController<R> {
    /// Directory of the session's client store.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }
}

impl<R: CommandRunner> JujuController<R> {
    async fn juju(&self, args: &[&str]) -> Result<Output> {
        debug!(controller = %self.alias, ?args, "juju");
        self.runner.run(JUJU, args).await
    }

    /// Runs `juju` and fails on a non-zero exit.
    async fn juju_ok(&self, args: &[&str]) -> Result<Output> {
        let output = self.juju(args).await?;
        if !output.status.success() {
            let subcommand = args.first().copied().unwrap_or_default();
            bail!("juju {subcommand} failed: {}", stderr_of(&output));
        }
        Ok(output)
    }

    fn model_ref(&self, model: &ModelInfo) -> String {
        format!("{}:{}", self.alias, model.qualified_name())
    }
}

impl<R: CommandRunner> ControllerApi for JujuController<R> {
    async fn is_connected(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        matches!(
            self.juju(&["show-controller", &self.alias, "--format", "json"]).await,
            Ok(output) if output.status.success()
        )
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.juju_ok(&["unregister", &self.alias, "--no-prompt"])
            .await
            .map(|_| ())
    }

    async fn info(&self) -> Result<Value> {
        let output = self
            .juju_ok(&["show-controller", &self.alias, "--format", "json"])
            .await?;
        let mut doc = json_stdout(&output, "show-controller")?;
        if let Some(info) = doc.get_mut(self.alias.as_str()) {
            return Ok(info.take());
        }
        Ok(doc)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let output = self
            .juju_ok(&["models", "-c", &self.alias, "--all", "--format", "json"])
            .await?;
        parse_models(&json_stdout(&output, "models")?)
    }

    async fn model_status(&self, model: &ModelInfo) -> Result<Value> {
        let model_ref = self.model_ref(model);
        let output = self
            .juju_ok(&["status", "-m", &model_ref, "--format", "json"])
            .await?;
        json_stdout(&output, "status")
    }

    async fn model_applications(&self, model: &ModelInfo) -> Result<ApplicationUnits> {
        Ok(parse_application_units(&self.model_status(model).await?))
    }

    async fn run_on_unit(
        &self,
        model: &ModelInfo,
        unit: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String> {
        let model_ref = self.model_ref(model);
        let wait = format!("{}s", timeout.as_secs());
        let args = [
            "exec",
            "-m",
            model_ref.as_str(),
            "--unit",
            unit,
            "--wait",
            wait.as_str(),
            "--",
            command,
        ];
        debug!(controller = %self.alias, unit, command, "juju exec");
        // the CLI gets a little longer than the remote wait
        let output = self
            .runner
            .run_with_timeout(JUJU, &args, timeout + Duration::from_secs(30))
            .await?;
        if !output.status.success() {
            bail!("command on unit {unit} failed: {}", stderr_of(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_app_config(&self, model: &ModelInfo, application: &str) -> Result<Option<Value>> {
        let model_ref = self.model_ref(model);
        let output = self
            .juju(&["config", "-m", &model_ref, application, "--format", "json"])
            .await?;
        if !output.status.success() {
            if is_not_found(&output) {
                return Ok(None);
            }
            bail!("reading config of {application} failed: {}", stderr_of(&output));
        }
        Ok(Some(parse_app_config(&json_stdout(&output, "config")?)))
    }

    async fn set_app_config(
        &self,
        model: &ModelInfo,
        application: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        let model_ref = self.model_ref(model);
        let pairs: Vec<String> = values.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args = vec!["config", "-m", model_ref.as_str(), application];
        args.extend(pairs.iter().map(String::as_str));
        self.juju_ok(&args).await.map(|_| ())
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserInfo>> {
        let output = self
            .juju(&["show-user", "-c", &self.alias, username, "--format", "json"])
            .await?;
        if !output.status.success() {
            if is_not_found(&output) {
                return Ok(None);
            }
            bail!("looking up user {username} failed: {}", stderr_of(&output));
        }
        parse_user(&json_stdout(&output, "show-user")?).map(Some)
    }

    async fn add_user(
        &self,
        username: &str,
        display_name: Option<&str>,
        password: &str,
    ) -> Result<UserInfo> {
        let mut args = vec!["add-user", "-c", self.alias.as_str(), username];
        if let Some(display_name) = display_name {
            args.extend(["--display-name", display_name]);
        }
        self.juju_ok(&args).await?;
        self.set_password(username, password).await?;
        Ok(UserInfo {
            username: username.to_string(),
            display_name: display_name.unwrap_or_default().to_string(),
            disabled: false,
        })
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        // asked twice: new password and confirmation
        let input = format!("{password}\n{password}\n");
        let output = self
            .runner
            .run_with_stdin(
                JUJU,
                &["change-user-password", "-c", &self.alias, username],
                input.as_bytes(),
            )
            .await?;
        if !output.status.success() {
            bail!("setting password of {username} failed: {}", stderr_of(&output));
        }
        Ok(())
    }

    async fn enable_user(&self, username: &str) -> Result<bool> {
        let output = self.juju(&["enable-user", "-c", &self.alias, username]).await?;
        Ok(output.status.success())
    }

    async fn disable_user(&self, username: &str) -> Result<bool> {
        let output = self.juju(&["disable-user", "-c", &self.alias, username]).await?;
        Ok(output.status.success())
    }

    async fn grant(&self, username: &str, acl: Acl) -> Result<bool> {
        let output = self
            .juju(&["grant", "-c", &self.alias, username, acl.as_str()])
            .await?;
        Ok(output.status.success())
    }

    async fn grant_model(&self, username: &str, model: &ModelInfo, acl: Acl) -> Result<bool> {
        let model = model.qualified_name();
        let output = self
            .juju(&["grant", "-c", &self.alias, username, acl.as_str(), &model])
            .await?;
        Ok(output.status.success())
    }

    async fn revoke(&self, username: &str, acl: Acl) -> Result<()> {
        self.juju_ok(&["revoke", "-c", &self.alias, username, acl.as_str()])
            .await
            .map(|_| ())
    }

    async fn revoke_model(&self, username: &str, model: &ModelInfo, acl: Acl) -> Result<()> {
        let model = model.qualified_name();
        self.juju_ok(&["revoke", "-c", &self.alias, username, acl.as_str(), &model])
            .await
            .map(|_| ())
    }
}

// ── Dialer ───────────────────────────────────────────────────────────────────

/// Logs in with `juju login`, the password fed on stdin.
pub struct JujuCliDialer<R> {
    runner: R,
}

impl<R> JujuCliDialer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> ControllerDialer for JujuCliDialer<R> {
    type Handle = JujuController<R>;

    async fn dial(&self, target: &TargetConfig, endpoint: &str) -> Result<JujuController<R>> {
        let alias = format!("spell-{}", target.uuid);
        let store = client_store(&alias, target, endpoint)?;
        let runner = self.runner.with_env("JUJU_DATA", store.path().as_os_str());

        let input = format!("{}\n", target.password);
        let output = runner
            .run_with_stdin(
                JUJU,
                &["login", "-c", &alias, "-u", &target.user],
                input.as_bytes(),
            )
            .await
            .with_context(|| format!("logging in to {endpoint}"))?;
        if !output.status.success() {
            bail!("login to {endpoint} failed: {}", stderr_of(&output));
        }
        debug!(controller = %target.name, alias = %alias, endpoint, "logged in");

        Ok(JujuController {
            runner,
            alias,
            connected: AtomicBool::new(true),
            store,
        })
    }
}
