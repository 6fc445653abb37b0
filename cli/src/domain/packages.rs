//! Package patch files, apt command building and install-log parsing.
//!
//! A patch file lists applications (by regex) and the packages each of their
//! units must end up with:
//!
//! ```yaml
//! applications:
//! - application: "^.*nova-cloud-controller.*$"
//!   dist_upgrade: false
//!   packages_to_update:
//!   - app: nova-common
//!     version: 2:21.2.4-0ubuntu2.1
//! ```

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::SpellError;

const UPDATE_TEMPLATE_HEAD: &str = "sudo apt-get update ; sudo apt-get \
    --option=Dpkg::Options::=--force-confold --option=Dpkg::Options::=--force-confdef";

// ── Patch file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFile {
    pub applications: Vec<ApplicationPatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPatch {
    /// Regex matched against application names from the start of the name.
    pub application: String,
    #[serde(default)]
    pub dist_upgrade: bool,
    #[serde(default)]
    pub packages_to_update: Vec<PackageToUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageToUpdate {
    #[serde(rename = "app")]
    pub package: String,
    /// Expected version after the update; `None` accepts any version.
    #[serde(default)]
    pub version: Option<String>,
}

impl PatchFile {
    /// Parses and validates a patch file.
    ///
    /// # Errors
    ///
    /// Returns [`SpellError::Configuration`] for malformed YAML, an invalid
    /// application regex, or an application with nothing to do.
    pub fn from_yaml(source: &str) -> Result<Self, SpellError> {
        let patch: Self = serde_yaml::from_str(source)
            .map_err(|e| SpellError::Configuration(format!("errors in patch file: {e}")))?;

        let mut problems = Vec::new();
        for app in &patch.applications {
            if let Err(e) = app_regex(&app.application) {
                problems.push(e.to_string());
            }
            if !app.dist_upgrade && app.packages_to_update.is_empty() {
                problems.push(format!(
                    "application['{}'] has no packages_to_update and dist_upgrade is false",
                    app.application
                ));
            }
        }
        if problems.is_empty() {
            Ok(patch)
        } else {
            Err(SpellError::Configuration(format!(
                "errors in patch file: {}",
                problems.join("; ")
            )))
        }
    }
}

fn app_regex(expr: &str) -> Result<Regex, SpellError> {
    Regex::new(&format!("^(?:{expr})"))
        .map_err(|e| SpellError::Configuration(format!("invalid application regex '{expr}': {e}")))
}

// ── Command building ─────────────────────────────────────────────────────────

/// apt command run on every unit of a matched application.
#[must_use]
pub fn update_command(app: &ApplicationPatch, dry_run: bool) -> String {
    let mut command = String::from(UPDATE_TEMPLATE_HEAD);
    if app.dist_upgrade {
        command.push_str(" dist-upgrade --upgrade -y");
    } else {
        command.push_str(" install --upgrade -y");
        for package in &app.packages_to_update {
            command.push(' ');
            command.push_str(&package.package);
        }
    }
    if dry_run {
        command.push_str(" --dry-run");
    }
    command
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageUpdate {
    pub package: String,
    pub from_version: String,
    pub to_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitUpdate {
    pub unit: String,
    pub command: String,
    pub raw_output: String,
    pub packages: Vec<PackageUpdate>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationUpdate {
    pub application: String,
    pub units: Vec<UnitUpdate>,
}

/// One patch entry and what it did on a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    #[serde(flatten)]
    pub patch: ApplicationPatch,
    pub results: Vec<ApplicationUpdate>,
}

/// Matches patch entries to a model's applications (name → unit names) and
/// prepares one pending [`UnitUpdate`] per unit.
///
/// # Errors
///
/// Returns [`SpellError::Configuration`] for an invalid application regex.
pub fn plan_updates(
    patch: &PatchFile,
    applications: &BTreeMap<String, Vec<String>>,
    dry_run: bool,
) -> Result<Vec<PatchOutcome>, SpellError> {
    patch
        .applications
        .iter()
        .map(|entry| {
            let re = app_regex(&entry.application)?;
            let command = update_command(entry, dry_run);
            let results = applications
                .iter()
                .filter(|(name, _)| re.is_match(name))
                .map(|(name, units)| ApplicationUpdate {
                    application: name.clone(),
                    units: units
                        .iter()
                        .map(|unit| UnitUpdate {
                            unit: unit.clone(),
                            command: command.clone(),
                            raw_output: String::new(),
                            packages: Vec::new(),
                            success: false,
                        })
                        .collect(),
                })
                .collect();
            Ok(PatchOutcome {
                patch: entry.clone(),
                results,
            })
        })
        .collect()
}

/// Records a unit's apt output: parses it and sets the success flag.
pub fn complete_unit(unit: &mut UnitUpdate, expected: &[PackageToUpdate], stdout: String) {
    unit.packages = parse_install_log(&stdout);
    unit.success = all_expected_installed(expected, &unit.packages);
    unit.raw_output = stdout;
}

/// `true` when every expected `(package, version)` pair was installed.
#[must_use]
pub fn all_expected_installed(expected: &[PackageToUpdate], installed: &[PackageUpdate]) -> bool {
    let installed: HashSet<(&str, &str)> = installed
        .iter()
        .map(|p| (p.package.as_str(), p.to_version.as_str()))
        .collect();
    expected.iter().all(|want| match &want.version {
        Some(version) => installed.contains(&(want.package.as_str(), version.as_str())),
        None => installed.iter().any(|(name, _)| *name == want.package),
    })
}

// ── Install log ──────────────────────────────────────────────────────────────

/// Extracts `(package, from, to)` triples from apt output.
///
/// Recognised lines:
/// - `Inst libdrm2 [2.4.110-1ubuntu1] (2.4.113-2~ubuntu0.22.04.1 Ubuntu:22.04/jammy-updates [amd64])`
/// - `Unpacking software-properties-common (0.99.9.11) over (0.99.9.10)`
///
/// Anything else is ignored.
#[must_use]
pub fn parse_install_log(log: &str) -> Vec<PackageUpdate> {
    log.lines().filter_map(parse_install_line).collect()
}

fn parse_install_line(line: &str) -> Option<PackageUpdate> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (name, from, to) = match tokens.as_slice() {
        ["Inst", name, from, to, ..] if from.starts_with('[') && to.starts_with('(') => {
            (*name, *from, *to)
        }
        ["Unpacking", name, to, "over", from, ..] => (*name, *from, *to),
        _ => return None,
    };
    let strip = |v: &str| v.trim_matches(|c| matches!(c, '(' | ')' | '[' | ']')).to_string();
    let (from_version, to_version) = (strip(from), strip(to));
    if name.is_empty() || from_version.is_empty() || to_version.is_empty() {
        return None;
    }
    Some(PackageUpdate {
        package: name.to_string(),
        from_version,
        to_version,
    })
}
