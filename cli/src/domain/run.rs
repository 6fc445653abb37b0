//! Run strategy and per-run options.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::SpellError;
use crate::domain::target::PortRange;

/// Default number of targets per batch.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default per-target command deadline.
pub const DEFAULT_TARGET_TIMEOUT: Duration = Duration::from_secs(600);

/// Concurrency strategy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunType {
    /// One target at a time, in input order.
    #[default]
    Serial,
    /// Fixed-size groups run concurrently, groups one after another.
    Batch { size: NonZeroUsize },
    /// Every target at once; records arrive in completion order.
    Parallel,
}

impl RunType {
    /// `true` for strategies that poll several targets at the same time.
    #[must_use]
    pub fn is_concurrent(self) -> bool {
        !matches!(self, Self::Serial)
    }

    /// Builds a run type from its CLI name and the batch size flag.
    ///
    /// # Errors
    ///
    /// Returns [`SpellError::Configuration`] for an unknown name.
    pub fn from_name(name: &str, batch_size: NonZeroUsize) -> Result<Self, SpellError> {
        match name.parse::<Self>()? {
            Self::Batch { .. } => Ok(Self::Batch { size: batch_size }),
            other => Ok(other),
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => f.write_str("serial"),
            Self::Batch { .. } => f.write_str("batch"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for RunType {
    type Err = SpellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "batch" => Ok(Self::Batch {
                size: DEFAULT_BATCH_SIZE,
            }),
            "parallel" => Ok(Self::Parallel),
            other => Err(SpellError::Configuration(format!(
                "unknown run type '{other}' (expected serial, batch or parallel)"
            ))),
        }
    }
}

/// Options of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub run_type: RunType,
    /// Ping every target first and abort if any is unreachable.
    pub pre_check: bool,
    /// Overrides the port range of every target's tunnel.
    pub port_range: Option<PortRange>,
    pub target_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_type: RunType::Serial,
            pre_check: false,
            port_range: None,
            target_timeout: DEFAULT_TARGET_TIMEOUT,
        }
    }
}
