//! Concrete commands run against a mock controller session.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use serde_json::{Value, json};
use spell_cli::application::command::{CommandContext, SpellCommand, run_command};
use spell_cli::application::ports::{ControllerDialer, UserInfo};
use spell_cli::application::spells::{
    AddUser, ApplicationConfig, Config, ConfigAction, DisableUser, EnableUser, Grant, Ping,
    RemoveUser, Revoke, Status, UpdatePackages,
};
use spell_cli::domain::packages::PatchFile;
use spell_cli::domain::result::CommandResult;
use spell_cli::domain::{Acl, SpellError, TargetConfig};

use crate::mocks::{MockController, MockDialer, Remote, SharedRemote, model, target};

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Session {
    remote: SharedRemote,
    controller: MockController,
    target: TargetConfig,
}

impl Session {
    async fn open(remote: Remote) -> Self {
        let dialer = MockDialer::default();
        let remote = dialer.add_remote("alpha", remote);
        let target = target("alpha");
        let controller = dialer
            .dial(&target, &target.endpoint)
            .await
            .expect("dial");
        Self {
            remote,
            controller,
            target,
        }
    }

    async fn run(&self, command: &impl SpellCommand) -> CommandResult {
        run_command(
            command,
            CommandContext {
                controller: &self.controller,
                target: &self.target,
                deadline: None,
            },
        )
        .await
    }

    async fn dry_run(&self, command: &impl SpellCommand) -> CommandResult {
        command
            .dry_run(CommandContext {
                controller: &self.controller,
                target: &self.target,
                deadline: None,
            })
            .await
            .expect("dry run")
    }
}

fn user(name: &str) -> UserInfo {
    UserInfo {
        username: name.to_string(),
        display_name: String::new(),
        disabled: true,
    }
}

fn remote_with_user(name: &str) -> Remote {
    let mut remote = Remote::reachable();
    remote.users.insert(name.to_string(), user(name));
    remote
}

fn add_user(name: &str) -> AddUser {
    AddUser {
        user: name.to_string(),
        display_name: Some("Bob B.".to_string()),
        password: None,
        acl: None,
        overwrite: false,
        models: Vec::new(),
    }
}

// ── Ping / status ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_reports_unreachable_without_failing() {
    let session = Session::open(Remote::default()).await;
    let result = session.run(&Ping).await;
    assert!(result.success);
    assert_eq!(result.output, Some(json!("unreachable")));
}

#[tokio::test]
async fn test_status_is_keyed_by_model_name() {
    let session = Session::open(Remote::reachable()).await;
    let result = session
        .run(&Status {
            models: vec!["default".to_string()],
        })
        .await;
    let output = result.output.expect("output");
    assert_eq!(output["default"]["status"], "active");
    assert!(output.get("controller").is_none());
}

#[tokio::test]
async fn test_model_listing_failure_becomes_failed_result() {
    let mut remote = Remote::reachable();
    remote.list_fails = true;
    let session = Session::open(remote).await;

    let result = session.run(&Status { models: Vec::new() }).await;

    assert!(!result.success);
    assert!(result.error.expect("error").to_string().contains("permission denied"));
}

#[tokio::test]
async fn test_default_dry_run_describes_command() {
    let session = Session::open(Remote::reachable()).await;
    let result = session.dry_run(&add_user("bob")).await;
    let output = result.output.expect("output");
    assert_eq!(output["command"], "add_user");
    assert_eq!(output["target"], session.target.uuid.to_string());
    assert!(session.remote.lock().unwrap().users.is_empty());
}

// ── Users ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_user_creates_enables_and_returns_password() {
    let session = Session::open(Remote::reachable()).await;

    let result = session.run(&add_user("bob")).await;

    assert!(result.success, "{:?}", result.error);
    let output = result.output.expect("output");
    let password = output["password"].as_str().expect("password");
    assert_eq!(password.len(), 40);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    let remote = session.remote.lock().unwrap();
    assert_eq!(remote.passwords["bob"], password);
    assert!(!remote.users["bob"].disabled);
    assert_eq!(remote.users["bob"].display_name, "Bob B.");
}

#[tokio::test]
async fn test_add_user_keeps_given_password() {
    let session = Session::open(Remote::reachable()).await;
    let mut command = add_user("bob");
    command.password = Some("hunter2".to_string());

    let result = session.run(&command).await;

    assert_eq!(result.output.expect("output")["password"], "hunter2");
}

#[tokio::test]
async fn test_add_existing_user_fails_without_overwrite() {
    let session = Session::open(remote_with_user("bob")).await;

    let result = session.run(&add_user("bob")).await;

    assert!(!result.success);
    assert!(result.error.expect("error").to_string().contains("already exists"));
    assert!(session.remote.lock().unwrap().passwords.is_empty());
}

#[tokio::test]
async fn test_add_existing_user_with_overwrite_resets_password() {
    let session = Session::open(remote_with_user("bob")).await;
    let mut command = add_user("bob");
    command.overwrite = true;

    let result = session.run(&command).await;

    assert!(result.success);
    let remote = session.remote.lock().unwrap();
    assert!(remote.passwords.contains_key("bob"));
    assert!(!remote.users["bob"].disabled);
}

#[tokio::test]
async fn test_add_user_with_acl_grants_controller_and_models() {
    let session = Session::open(Remote::reachable()).await;
    let mut command = add_user("bob");
    command.acl = Some(Acl::Write);
    command.models = vec!["default".to_string()];

    let result = session.run(&command).await;

    assert!(result.success);
    let grants = session.remote.lock().unwrap().grants.clone();
    assert_eq!(
        grants,
        [
            ("bob".to_string(), "login".to_string(), None),
            (
                "bob".to_string(),
                "write".to_string(),
                Some("default".to_string())
            ),
        ]
    );
}

#[tokio::test]
async fn test_add_user_refused_grant_fails_unless_overwrite() {
    let mut remote = Remote::reachable();
    remote.refuse_grants = true;
    let session = Session::open(remote).await;
    let mut command = add_user("bob");
    command.acl = Some(Acl::Read);

    assert!(!session.run(&command).await.success);

    command.overwrite = true;
    assert!(session.run(&command).await.success);
}

#[tokio::test]
async fn test_add_user_rejects_own_login_user() {
    let session = Session::open(Remote::reachable()).await;

    let result = session.run(&add_user("admin")).await;

    assert!(!result.success);
    assert_eq!(
        result.error.map(|e| e.to_string()),
        Some(SpellError::RemoteOperation("User can't add self".to_string()).to_string())
    );
    assert!(session.remote.lock().unwrap().users.is_empty());
}

#[tokio::test]
async fn test_enable_unknown_user_is_remote_operation_error() {
    let session = Session::open(Remote::reachable()).await;

    let result = session
        .run(&EnableUser {
            user: "ghost".to_string(),
        })
        .await;

    assert!(matches!(result.error, Some(SpellError::RemoteOperation(_))));
}

#[tokio::test]
async fn test_disable_user_marks_user_disabled() {
    let mut remote = remote_with_user("bob");
    remote.users.get_mut("bob").unwrap().disabled = false;
    let session = Session::open(remote).await;

    let result = session
        .run(&DisableUser {
            user: "bob".to_string(),
        })
        .await;

    assert_eq!(result.output, Some(json!(true)));
    assert!(session.remote.lock().unwrap().users["bob"].disabled);
}

#[tokio::test]
async fn test_remove_user_revokes_models_then_login_then_disables() {
    let mut remote = remote_with_user("bob");
    remote.users.get_mut("bob").unwrap().disabled = false;
    let session = Session::open(remote).await;

    let result = session
        .run(&RemoveUser {
            user: "bob".to_string(),
            models: Vec::new(),
        })
        .await;

    assert!(result.success, "{:?}", result.error);
    let remote = session.remote.lock().unwrap();
    assert_eq!(
        remote.revokes,
        [
            ("bob".to_string(), "read".to_string(), Some("default".to_string())),
            (
                "bob".to_string(),
                "read".to_string(),
                Some("controller".to_string())
            ),
            ("bob".to_string(), "login".to_string(), None),
        ]
    );
    assert!(remote.users["bob"].disabled);
}

#[tokio::test]
async fn test_remove_user_rejects_own_login_user() {
    let session = Session::open(Remote::reachable()).await;
    let result = session
        .run(&RemoveUser {
            user: "admin".to_string(),
            models: Vec::new(),
        })
        .await;
    assert!(!result.success);
    assert!(session.remote.lock().unwrap().revokes.is_empty());
}

#[tokio::test]
async fn test_revoke_controller_acl_skips_models() {
    let session = Session::open(Remote::reachable()).await;

    session
        .run(&Revoke {
            user: "bob".to_string(),
            acl: Acl::Superuser,
            models: vec!["default".to_string()],
        })
        .await;

    let revokes = session.remote.lock().unwrap().revokes.clone();
    assert_eq!(revokes, [("bob".to_string(), "superuser".to_string(), None)]);
}

#[tokio::test]
async fn test_grant_superuser_grants_admin_on_models() {
    let session = Session::open(Remote::reachable()).await;

    session
        .run(&Grant {
            user: "bob".to_string(),
            acl: Acl::Superuser,
            models: vec!["controller".to_string()],
        })
        .await;

    let grants = session.remote.lock().unwrap().grants.clone();
    assert_eq!(grants[0].1, "superuser");
    assert_eq!(
        grants[1],
        (
            "bob".to_string(),
            "admin".to_string(),
            Some("controller".to_string())
        )
    );
}

// ── Config ───────────────────────────────────────────────────────────────────

fn remote_with_config() -> Remote {
    let mut remote = Remote::reachable();
    remote.configs.insert(
        ("default".to_string(), "nova".to_string()),
        BTreeMap::from([
            ("debug".to_string(), json!("false")),
            ("workers".to_string(), json!("4")),
        ]),
    );
    remote
}

#[tokio::test]
async fn test_config_get_single_key() {
    let session = Session::open(remote_with_config()).await;

    let result = session
        .run(&Config {
            models: vec!["default".to_string()],
            action: ConfigAction::App {
                application: "nova".to_string(),
                get: Some("workers".to_string()),
                set: BTreeMap::new(),
            },
        })
        .await;

    assert_eq!(result.output, Some(json!({"default": {"workers": "4"}})));
}

#[tokio::test]
async fn test_config_set_returns_updated_config() {
    let session = Session::open(remote_with_config()).await;
    let command = Config {
        models: vec!["default".to_string()],
        action: ConfigAction::App {
            application: "nova".to_string(),
            get: None,
            set: BTreeMap::from([("debug".to_string(), "true".to_string())]),
        },
    };

    assert!(command.is_mutating());
    let result = session.run(&command).await;

    let output = result.output.expect("output");
    assert_eq!(output["default"]["debug"], "true");
    assert_eq!(output["default"]["workers"], "4");
}

#[tokio::test]
async fn test_config_missing_application_is_empty_not_error() {
    let session = Session::open(remote_with_config()).await;

    let result = session
        .run(&Config {
            models: Vec::new(),
            action: ConfigAction::App {
                application: "nova".to_string(),
                get: None,
                set: BTreeMap::from([("debug".to_string(), "true".to_string())]),
            },
        })
        .await;

    assert!(result.success);
    let output = result.output.expect("output");
    assert_eq!(output["controller"], json!({}));
    // nothing was created in the model that lacks the application
    let remote = session.remote.lock().unwrap();
    assert!(!remote
        .configs
        .contains_key(&("controller".to_string(), "nova".to_string())));
}

#[tokio::test]
async fn test_config_file_skips_absent_applications() {
    let session = Session::open(remote_with_config()).await;

    let result = session
        .run(&Config {
            models: vec!["default".to_string()],
            action: ConfigAction::File(vec![
                ApplicationConfig {
                    application: "nova".to_string(),
                    config: BTreeMap::from([("workers".to_string(), "8".to_string())]),
                },
                ApplicationConfig {
                    application: "ntp".to_string(),
                    config: BTreeMap::from([("source".to_string(), "pool".to_string())]),
                },
            ]),
        })
        .await;

    let output = result.output.expect("output");
    assert_eq!(output["default"]["nova"]["workers"], "8");
    assert!(output["default"].get("ntp").is_none());
}

// ── Packages ─────────────────────────────────────────────────────────────────

const PATCH: &str = r#"
applications:
- application: "nova-compute"
  packages_to_update:
  - app: nova-common
    version: 2:21.2.4-0ubuntu2.1
"#;

const APT_LOG: &str = "\
Reading package lists...
Inst nova-common [2:21.2.4-0ubuntu2] (2:21.2.4-0ubuntu2.1 Ubuntu:20.04/focal-updates [all])
";

fn remote_with_units() -> Remote {
    let mut remote = Remote::reachable();
    remote.applications.insert(
        "default".to_string(),
        BTreeMap::from([
            (
                "nova-compute".to_string(),
                vec!["nova-compute/0".to_string(), "nova-compute/1".to_string()],
            ),
            ("ntp".to_string(), vec!["ntp/0".to_string()]),
        ]),
    );
    remote.apt_log = APT_LOG.to_string();
    remote
}

fn update_packages() -> UpdatePackages {
    UpdatePackages {
        patch: PatchFile::from_yaml(PATCH).expect("patch"),
        models: vec!["default".to_string()],
    }
}

fn units(output: &Value) -> &Vec<Value> {
    output["default"][0]["results"][0]["units"]
        .as_array()
        .expect("units")
}

#[tokio::test]
async fn test_update_packages_runs_apt_on_matching_units() {
    let session = Session::open(remote_with_units()).await;

    let result = session.run(&update_packages()).await;

    let output = result.output.expect("output");
    let units = units(&output);
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u["success"] == true));
    assert_eq!(units[0]["packages"][0]["package"], "nova-common");
    let commands = session.remote.lock().unwrap().unit_commands.clone();
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().all(|(_, c)| c.contains("install --upgrade -y nova-common")));
    assert!(commands.iter().all(|(_, c)| !c.contains("--dry-run")));
}

#[tokio::test]
async fn test_update_packages_unit_failure_is_recorded() {
    let mut remote = remote_with_units();
    remote.failing_units.insert("nova-compute/1".to_string());
    let session = Session::open(remote).await;

    let result = session.run(&update_packages()).await;

    assert!(result.success);
    let output = result.output.expect("output");
    let units = units(&output);
    assert_eq!(units[0]["success"], true);
    assert_eq!(units[1]["success"], false);
    assert!(units[1]["raw_output"].as_str().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_update_packages_dry_run_uses_apt_simulation() {
    let session = Session::open(remote_with_units()).await;

    session.dry_run(&update_packages()).await;

    let commands = session.remote.lock().unwrap().unit_commands.clone();
    assert!(!commands.is_empty());
    assert!(commands.iter().all(|(_, c)| c.ends_with("--dry-run")));
}
