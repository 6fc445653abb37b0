//! Integration tests for the spell binary
//!
//! No controller is reachable here: `PATH` points at an empty directory so
//! every dial fails fast, which exercises configuration loading, target
//! selection, dispatch and rendering end to end.

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r"
default:
  controller:
    owner: ops
    user: admin
    password: secret
    retry_policy:
      attempt: 1
      wait: 0
      timeout: 10
    ca_cert: |
      -----BEGIN CERTIFICATE-----
      MIIBfake
      -----END CERTIFICATE-----
controllers:
  - uuid: 03ac3b42-bba8-477b-854e-5715a7d3320a
    name: prod-1
    customer: acme
    endpoint: 10.1.1.99:17070
  - uuid: e9fe93a8-b705-4067-8f30-6eec183eeb4f
    name: lab-1
    customer: initech
    endpoint: 10.1.2.99:17070
    tags: [lab]
";

fn spell() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("spell"));
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("SPELL_CONFIG");
    cmd.env_remove("SPELL_YES");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A workspace with a config file, an empty cache and no `juju` on `PATH`.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("config.yaml"), config).expect("write config");
        std::fs::create_dir(dir.path().join("bin")).expect("bin dir");
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn spell(&self) -> Command {
        let mut cmd = spell();
        cmd.env("SPELL_CONFIG", self.path("config.yaml"));
        cmd.env("SPELL_CACHE_DIR", self.path("cache"));
        cmd.env("PATH", self.path("bin"));
        cmd
    }
}

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).expect("write file");
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    spell().assert().code(2).stderr(predicate::str::contains(
        "Run commands across many Juju controllers at once",
    ));
}

#[test]
fn test_cli_help_lists_commands() {
    spell()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("ping"))
        .stdout(predicate::str::contains("add-user"))
        .stdout(predicate::str::contains("update-packages"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    spell()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spell"));
}

#[test]
fn test_subcommand_help_shows_target_flags() {
    spell()
        .args(["ping", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--run-type"))
        .stdout(predicate::str::contains("--filter"))
        .stdout(predicate::str::contains("--pre-check"));
}

#[test]
fn test_unknown_run_type_is_usage_error() {
    spell()
        .args(["ping", "--run-type", "random"])
        .assert()
        .code(2);
}

// --- Configuration errors ---

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().expect("tempdir");
    spell()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .arg("ping")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_invalid_controller_is_reported() {
    let fixture = Fixture::new(&CONFIG.replace("10.1.2.99:17070", "not a host!"));
    fixture
        .spell()
        .arg("ping")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid api endpoint"));
}

#[test]
fn test_filter_matching_nothing_fails() {
    let fixture = Fixture::new(CONFIG);
    fixture
        .spell()
        .args(["ping", "--filter", "customer=nobody"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no controller matches the filter"));
}

#[test]
fn test_json_error_object_carries_code() {
    let fixture = Fixture::new(CONFIG);
    fixture
        .spell()
        .args(["--json", "ping", "--filter", "customer=nobody"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(r#""code": "configuration""#));
}

#[test]
fn test_list_models_with_models_is_usage_error() {
    spell()
        .args(["list-models", "--models", "default"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "--models cannot be used with list-models",
        ));
}

#[test]
fn test_malformed_filter_is_usage_error() {
    spell().args(["ping", "--filter", "customer"]).assert().code(2);
}

// --- Dispatch ---

#[test]
fn test_ping_unreachable_controllers_reports_each_and_exits_one() {
    let fixture = Fixture::new(CONFIG);
    fixture
        .spell()
        .arg("ping")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("prod-1"))
        .stdout(predicate::str::contains("lab-1"))
        .stderr(predicate::str::contains("2 of 2 controller(s) failed"));
}

#[test]
fn test_json_records_are_sorted_after_parallel_run() {
    let fixture = Fixture::new(CONFIG);
    let output = fixture
        .spell()
        .args(["--json", "ping", "--run-type", "parallel"])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(1));
    let records: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let records = records.as_array().expect("array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["context"]["name"], "lab-1");
    assert_eq!(records[1]["context"]["name"], "prod-1");
    assert_eq!(records[0]["success"], false);
    assert!(records[0]["error"].as_str().is_some());
    assert_eq!(
        records[1]["context"]["uuid"],
        "03ac3b42-bba8-477b-854e-5715a7d3320a"
    );
}

#[test]
fn test_filter_limits_targets() {
    let fixture = Fixture::new(CONFIG);
    let output = fixture
        .spell()
        .args(["--json", "status", "--filter", "tags=lab"])
        .output()
        .expect("run");

    let records: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let records = records.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["context"]["customer"], "initech");
}

#[test]
fn test_quiet_still_shows_failures() {
    let fixture = Fixture::new(CONFIG);
    fixture
        .spell()
        .args(["--quiet", "ping", "--filter", "customer=acme"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("prod-1"))
        .stdout(predicate::str::contains("lab-1").not());
}

#[test]
fn test_mutating_command_with_yes_skips_prompt() {
    let fixture = Fixture::new(CONFIG);
    fixture
        .spell()
        .args(["--yes", "disable-user", "--user", "bob"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("2 of 2 controller(s) failed"));
}

#[test]
fn test_update_packages_rejects_invalid_patch_before_dispatch() {
    let fixture = Fixture::new(CONFIG);
    let patch = fixture.path("patch.yaml");
    write(&patch, "applications:\n- application: nova\n");

    fixture
        .spell()
        .args(["--yes", "update-packages", "--patch"])
        .arg(&patch)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no packages_to_update"));
}

#[test]
fn test_config_file_must_be_yaml_list() {
    let fixture = Fixture::new(CONFIG);
    let file = fixture.path("apps.yaml");
    write(&file, "application: nova\n");

    fixture
        .spell()
        .args(["--yes", "config", "--file"])
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid config file"));
}
