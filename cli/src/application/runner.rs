//! Dispatch runner: one command across many targets.
//!
//! Per-target futures are polled together inside the caller's task, so no
//! `Send` bound is needed on controller handles or commands.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::application::command::{CommandContext, Deadline, SpellCommand, run_command};
use crate::application::connection::{ConnectOptions, ConnectionManager};
use crate::application::ports::{ControllerDialer, NetworkProbe, TunnelLauncher};
use crate::application::spells::ping::{PING_UNREACHABLE, Ping};
use crate::domain::error::SpellError;
use crate::domain::result::{CommandResult, ResultRecord, merge_result};
use crate::domain::run::{RunOptions, RunType};
use crate::domain::target::TargetConfig;

/// Extra time a deadline-aware command gets to hand back its partial output.
pub const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Runs commands through a [`ConnectionManager`] and always releases it.
pub struct Runner<'m, D: ControllerDialer, L: TunnelLauncher, P> {
    manager: &'m ConnectionManager<D, L, P>,
}

impl<'m, D, L, P> Runner<'m, D, L, P>
where
    D: ControllerDialer,
    L: TunnelLauncher,
    P: NetworkProbe,
{
    #[must_use]
    pub fn new(manager: &'m ConnectionManager<D, L, P>) -> Self {
        Self { manager }
    }

    /// Runs `command` on every target and returns one record per target.
    ///
    /// With `pre_check` set, every target is pinged first and the ping records
    /// are returned instead if any target is unreachable. Connections are
    /// released exactly once before this returns, even if a command panics.
    ///
    /// # Errors
    ///
    /// [`SpellError::UnsupportedStrategy`] when a concurrent run is requested
    /// for a command that needs whole-subnet tunnels.
    pub async fn run<S: SpellCommand>(
        &self,
        targets: &[TargetConfig],
        command: &S,
        options: RunOptions,
    ) -> Result<Vec<ResultRecord>, SpellError> {
        let outcome = AssertUnwindSafe(self.dispatch(targets, command, options))
            .catch_unwind()
            .await;

        for error in self.manager.release_all().await {
            warn!(error = %error, "connection release failed");
        }

        match outcome {
            Ok(records) => records,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn dispatch<S: SpellCommand>(
        &self,
        targets: &[TargetConfig],
        command: &S,
        options: RunOptions,
    ) -> Result<Vec<ResultRecord>, SpellError> {
        if options.run_type.is_concurrent() && command.needs_subnet_tunnel() {
            return Err(SpellError::UnsupportedStrategy(options.run_type.to_string()));
        }
        let subnet_tunnel = command.needs_subnet_tunnel();

        if options.pre_check {
            let pings = self.run_strategy(targets, &Ping, options, subnet_tunnel).await;
            let unreachable: Vec<_> = pings
                .iter()
                .filter(|r| {
                    !r.success
                        || r.output.as_ref().and_then(|o| o.as_str()) == Some(PING_UNREACHABLE)
                })
                .map(|r| r.context.name.as_str())
                .collect();
            if !unreachable.is_empty() {
                warn!(targets = ?unreachable, "pre-check failed, command not run");
                return Ok(pings);
            }
        }

        info!(
            command = command.name(),
            run_type = %options.run_type,
            targets = targets.len(),
            "running command"
        );
        Ok(self.run_strategy(targets, command, options, subnet_tunnel).await)
    }

    async fn run_strategy<S: SpellCommand>(
        &self,
        targets: &[TargetConfig],
        command: &S,
        options: RunOptions,
        subnet_tunnel: bool,
    ) -> Vec<ResultRecord> {
        let run_one = |target| self.run_one(target, command, options, subnet_tunnel);
        match options.run_type {
            RunType::Serial => {
                let mut records = Vec::with_capacity(targets.len());
                for target in targets {
                    records.push(run_one(target).await);
                }
                records
            }
            RunType::Batch { size } => {
                let mut records = Vec::with_capacity(targets.len());
                for batch in targets.chunks(size.get()) {
                    records.extend(join_all(batch.iter().map(run_one)).await);
                }
                records
            }
            RunType::Parallel => {
                let pending: FuturesUnordered<_> = targets.iter().map(run_one).collect();
                pending.collect().await
            }
        }
    }

    async fn run_one<S: SpellCommand>(
        &self,
        target: &TargetConfig,
        command: &S,
        options: RunOptions,
        subnet_tunnel: bool,
    ) -> ResultRecord {
        let connect = ConnectOptions {
            port_range: options.port_range,
            subnet_tunnel,
            reconnect: false,
        };
        let deadline = Deadline::after(options.target_timeout);
        let work = async {
            match self.manager.get_connection(target, connect).await {
                Ok(handle) => {
                    let ctx = CommandContext {
                        controller: handle.as_ref(),
                        target,
                        deadline: Some(deadline),
                    };
                    run_command(command, ctx).await
                }
                Err(e) => {
                    warn!(controller = %target.name, error = %e, "connection failed");
                    CommandResult::failed(e)
                }
            }
        };

        let cutoff = if command.observes_deadline() {
            deadline.at + DEADLINE_GRACE
        } else {
            deadline.at
        };
        let result = match tokio::time::timeout_at(cutoff, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(controller = %target.name, "command timed out");
                CommandResult::failed(SpellError::Timeout {
                    target: target.name.clone(),
                    secs: options.target_timeout.as_secs(),
                })
            }
        };
        merge_result(target, result)
    }
}
