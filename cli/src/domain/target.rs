//! Target (controller) configuration types and pure validators.
//!
//! A [`TargetConfig`] is immutable once loaded. Validation happens once at the
//! configuration boundary so the rest of the crate can trust its fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::SpellError;

// ── Constants ────────────────────────────────────────────────────────────────

/// Default local port range used for point-to-point tunnels.
pub const DEFAULT_PORT_RANGE: PortRange = PortRange {
    start: 17071,
    end: 17170,
};

/// Default risk level of a controller (1 = most critical, 5 = least).
pub const DEFAULT_RISK: u8 = 5;

static API_ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?$",
    )
    .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static CA_CERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^-*BEGIN CERTIFICATE-*\n.*\n-*END CERTIFICATE-*\n?$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static SUBNET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,3}\.){3}[0-9]{1,3}($|/(8|9|1[0-9]|2[0-9]|3[0-2]))$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+@)?[A-Za-z0-9_.\-]+(:\d+)?$")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

// ── Port range ───────────────────────────────────────────────────────────────

/// Half-open range of local TCP ports, written `"start:end"` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Iterate every port in the range.
    pub fn ports(self) -> impl Iterator<Item = u16> {
        self.start..self.end
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl std::str::FromStr for PortRange {
    type Err = SpellError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || SpellError::Configuration(format!("invalid port range '{value}'"));
        let (start, end) = value.split_once(':').ok_or_else(invalid)?;
        let start: u16 = start.trim().parse().map_err(|_| invalid())?;
        let end: u16 = end.trim().parse().map_err(|_| invalid())?;
        if start >= end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

impl TryFrom<String> for PortRange {
    type Error = SpellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

// ── Target config ────────────────────────────────────────────────────────────

/// Label → optional list of model patterns. `None` means "every model".
pub type ModelMapping = BTreeMap<String, Option<Vec<String>>>;

/// How to reach a controller that is not directly routable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSpec {
    /// ssh destination, `[user@]host[:port]`.
    pub destination: String,
    /// Jump hosts, in order.
    #[serde(default)]
    pub jumps: Option<Vec<String>>,
    /// Subnets routed through a whole-subnet tunnel.
    #[serde(default)]
    pub subnets: Option<Vec<String>>,
    /// Local port range for point-to-point forwarding.
    #[serde(default, alias = "port-range")]
    pub port_range: Option<PortRange>,
}

impl TunnelSpec {
    #[must_use]
    pub fn jumps(&self) -> &[String] {
        self.jumps.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn subnets(&self) -> &[String] {
        self.subnets.as_deref().unwrap_or_default()
    }
}

/// Dial retry policy. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    /// Maximum number of dial attempts.
    pub attempt: Option<u32>,
    /// Seconds between attempts.
    pub wait: Option<u64>,
    /// Overall deadline in seconds.
    pub timeout: Option<u64>,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 3;
    pub const DEFAULT_WAIT_SECS: u64 = 3;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt.unwrap_or(Self::DEFAULT_ATTEMPTS).max(1)
    }

    #[must_use]
    pub fn wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.wait.unwrap_or(Self::DEFAULT_WAIT_SECS))
    }

    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }
}

/// One controller entry of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub uuid: Uuid,
    pub name: String,
    pub customer: String,
    pub owner: String,
    pub endpoint: String,
    pub ca_cert: String,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub model_mapping: ModelMapping,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_risk")]
    pub risk: u8,
    #[serde(default)]
    pub connection: Option<TunnelSpec>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_risk() -> u8 {
    DEFAULT_RISK
}

impl TargetConfig {
    /// Identity fields attached to every result record.
    #[must_use]
    pub fn context(&self) -> TargetContext {
        TargetContext {
            uuid: self.uuid.to_string(),
            name: self.name.clone(),
            customer: self.customer.clone(),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.unwrap_or_default()
    }
}

/// Static identity context of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContext {
    pub uuid: String,
    pub name: String,
    pub customer: String,
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates every field with a format constraint and reports all problems at once.
///
/// # Errors
///
/// Returns [`SpellError::Configuration`] listing each invalid field.
pub fn validate_target(target: &TargetConfig) -> Result<(), SpellError> {
    let mut problems = Vec::new();

    if target.name.trim().is_empty() {
        problems.push("name must not be empty".to_string());
    }
    if !API_ENDPOINT_RE.is_match(&target.endpoint) {
        problems.push(format!("invalid api endpoint definition '{}'", target.endpoint));
    }
    if !CA_CERT_RE.is_match(target.ca_cert.trim_end()) {
        problems.push("invalid ca-cert format".to_string());
    }
    if !(1..=5).contains(&target.risk) {
        problems.push(format!("risk must be between 1 and 5, got {}", target.risk));
    }
    if let Some(tunnel) = &target.connection {
        if !DESTINATION_RE.is_match(&tunnel.destination) {
            problems.push(format!(
                "invalid destination definition '{}'",
                tunnel.destination
            ));
        }
        for jump in tunnel.jumps() {
            if !DESTINATION_RE.is_match(jump) {
                problems.push(format!("invalid jump definition '{jump}'"));
            }
        }
        for subnet in tunnel.subnets() {
            if !SUBNET_RE.is_match(subnet) {
                problems.push(format!("invalid subnet definition '{subnet}'"));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SpellError::Configuration(format!(
            "controller '{}': {}",
            target.name,
            problems.join("; ")
        )))
    }
}
