//! SSH tunnels: `ssh -L` port forwards and `sshuttle` subnet routes.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::application::ports::{CommandRunner, TunnelLauncher, TunnelProcess};
use crate::domain::target::TunnelSpec;

/// `ssh` arguments forwarding `localhost:<local_port>` to `endpoint`.
#[must_use]
pub fn port_forward_args(spec: &TunnelSpec, local_port: u16, endpoint: &str) -> Vec<String> {
    let mut args = vec![
        spec.destination.clone(),
        "-N".to_string(),
        "-L".to_string(),
        format!("localhost:{local_port}:{endpoint}"),
    ];
    if !spec.jumps().is_empty() {
        args.push("-J".to_string());
        args.push(spec.jumps().join(","));
    }
    args
}

/// `sshuttle` arguments routing the tunnel subnets through its destination.
#[must_use]
pub fn sshuttle_args(spec: &TunnelSpec) -> Vec<String> {
    let mut args: Vec<String> = spec.subnets().to_vec();
    args.push("-r".to_string());
    args.push(spec.destination.clone());
    if !spec.jumps().is_empty() {
        args.push("-e".to_string());
        args.push(format!("ssh -J {}", spec.jumps().join(",")));
    }
    args
}

/// How long a tunnel gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// A running `ssh` or `sshuttle` child.
pub struct SshTunnel {
    child: Child,
}

impl SshTunnel {
    /// Asks the child to exit; `true` if it did within [`TERMINATE_GRACE`].
    ///
    /// `sshuttle` restores the firewall rules it installed only when it is
    /// allowed to shut down.
    #[cfg(unix)]
    async fn stop_gracefully(&mut self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) else {
            return false;
        };
        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            warn!(pid, error = %err, "failed to send SIGTERM to tunnel");
            return false;
        }
        tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
            .await
            .is_ok_and(|status| status.is_ok())
    }

    #[cfg(not(unix))]
    async fn stop_gracefully(&mut self) -> bool {
        false
    }
}

impl TunnelProcess for SshTunnel {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self) -> Result<()> {
        if !self.is_running() || self.stop_gracefully().await {
            return Ok(());
        }
        warn!("tunnel did not exit after SIGTERM, killing it");
        self.child
            .kill()
            .await
            .context("failed to terminate tunnel process")
    }
}

/// Launches tunnels through a [`CommandRunner`].
pub struct SshTunnelLauncher<R> {
    runner: R,
}

impl<R: CommandRunner> SshTunnelLauncher<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn launch(&self, program: &str, args: &[String]) -> Result<SshTunnel> {
        debug!(program, ?args, "spawning tunnel");
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let child = self.runner.spawn(program, &args)?;
        Ok(SshTunnel { child })
    }
}

impl<R: CommandRunner> TunnelLauncher for SshTunnelLauncher<R> {
    type Tunnel = SshTunnel;

    async fn port_forward(
        &self,
        spec: &TunnelSpec,
        local_port: u16,
        endpoint: &str,
    ) -> Result<SshTunnel> {
        info!(
            endpoint,
            local_port,
            destination = %spec.destination,
            "port forwarding"
        );
        self.launch("ssh", &port_forward_args(spec, local_port, endpoint))
    }

    async fn subnet_tunnel(&self, spec: &TunnelSpec) -> Result<SshTunnel> {
        info!(subnets = ?spec.subnets(), destination = %spec.destination, "sshuttle");
        self.launch("sshuttle", &sshuttle_args(spec))
    }
}
