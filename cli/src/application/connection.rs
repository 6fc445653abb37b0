//! Connection manager: owns live controller sessions and their tunnels.
//!
//! One registry per manager, keyed by target name. The registry lock is held
//! only for map reads and writes, never across a dial or a teardown.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::ports::{
    ControllerApi, ControllerDialer, NetworkProbe, TunnelLauncher, TunnelProcess,
};
use crate::domain::error::SpellError;
use crate::domain::target::{DEFAULT_PORT_RANGE, PortRange, TargetConfig};

/// How to obtain a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Overrides the target's tunnel port range.
    pub port_range: Option<PortRange>,
    /// Route the target's subnets instead of forwarding one port.
    pub subnet_tunnel: bool,
    /// Tear down any registered connection and dial again.
    pub reconnect: bool,
}

struct Connection<H, T> {
    handle: Arc<H>,
    tunnel: Option<T>,
}

impl<H: ControllerApi, T: TunnelProcess> Connection<H, T> {
    /// Disconnect the handle and stop the tunnel. Both steps always run.
    async fn teardown(self) -> anyhow::Result<()> {
        let disconnected = self.handle.disconnect().await;
        let terminated = match self.tunnel {
            Some(mut tunnel) => tunnel.terminate().await,
            None => Ok(()),
        };
        disconnected.and(terminated)
    }
}

/// Registry of live connections.
pub struct ConnectionManager<D: ControllerDialer, L: TunnelLauncher, P> {
    dialer: D,
    launcher: L,
    probe: P,
    default_port_range: PortRange,
    registry: Mutex<HashMap<String, Connection<D::Handle, L::Tunnel>>>,
}

impl<D, L, P> ConnectionManager<D, L, P>
where
    D: ControllerDialer,
    L: TunnelLauncher,
    P: NetworkProbe,
{
    #[must_use]
    pub fn new(dialer: D, launcher: L, probe: P) -> Self {
        Self {
            dialer,
            launcher,
            probe,
            default_port_range: DEFAULT_PORT_RANGE,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Port range used when neither the caller nor the target sets one.
    #[must_use]
    pub fn with_default_port_range(mut self, range: PortRange) -> Self {
        self.default_port_range = range;
        self
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.registry.lock().await.contains_key(name)
    }

    /// Returns a live session for `target`, dialing one if needed.
    ///
    /// # Errors
    ///
    /// [`SpellError::NoFreePort`] when a tunnel needs a port and none is free,
    /// [`SpellError::Connection`] when the tunnel cannot start or the dial fails.
    pub async fn get_connection(
        &self,
        target: &TargetConfig,
        options: ConnectOptions,
    ) -> Result<Arc<D::Handle>, SpellError> {
        let name = target.name.as_str();

        if let Some((handle, tunnel_alive)) = self.registered(name).await {
            if !options.reconnect && tunnel_alive && handle.is_connected().await {
                debug!(controller = name, "reusing registered connection");
                return Ok(handle);
            }
            let stale = {
                let mut registry = self.registry.lock().await;
                if registry
                    .get(name)
                    .is_some_and(|c| Arc::ptr_eq(&c.handle, &handle))
                {
                    registry.remove(name)
                } else {
                    None
                }
            };
            if let Some(connection) = stale {
                info!(controller = name, forced = options.reconnect, "dropping connection");
                if let Err(e) = connection.teardown().await {
                    warn!(controller = name, error = %e, "failed to tear down old connection");
                }
            }
        }

        let connection = self.establish(target, options).await?;

        let mut registry = self.registry.lock().await;
        if let Some(existing) = registry.get(name) {
            let handle = Arc::clone(&existing.handle);
            drop(registry);
            debug!(controller = name, "connection registered concurrently, dropping the new one");
            if let Err(e) = connection.teardown().await {
                warn!(controller = name, error = %e, "failed to tear down duplicate connection");
            }
            return Ok(handle);
        }
        let handle = Arc::clone(&connection.handle);
        registry.insert(name.to_string(), connection);
        info!(controller = name, "connected");
        Ok(handle)
    }

    /// Disconnects every registered session and stops every tunnel.
    ///
    /// Every entry is attempted; the failures are returned.
    pub async fn release_all(&self) -> Vec<SpellError> {
        let entries: Vec<_> = self.registry.lock().await.drain().collect();
        let count = entries.len();
        let mut errors = Vec::new();
        for (name, connection) in entries {
            if let Err(e) = connection.teardown().await {
                warn!(controller = %name, error = %e, "failed to release connection");
                errors.push(SpellError::Connection {
                    target: name,
                    reason: format!("release failed: {e:#}"),
                });
            }
        }
        if count > 0 {
            info!(count, failed = errors.len(), "released connections");
        }
        errors
    }

    async fn registered(&self, name: &str) -> Option<(Arc<D::Handle>, bool)> {
        let mut registry = self.registry.lock().await;
        let connection = registry.get_mut(name)?;
        let tunnel_alive = connection
            .tunnel
            .as_mut()
            .is_none_or(|tunnel| tunnel.is_running());
        Some((Arc::clone(&connection.handle), tunnel_alive))
    }

    async fn establish(
        &self,
        target: &TargetConfig,
        options: ConnectOptions,
    ) -> Result<Connection<D::Handle, L::Tunnel>, SpellError> {
        let connection_error = |reason: String| SpellError::Connection {
            target: target.name.clone(),
            reason,
        };

        let (endpoint, tunnel) = match &target.connection {
            Some(spec) if options.subnet_tunnel && !spec.subnets().is_empty() => {
                let tunnel = self
                    .launcher
                    .subnet_tunnel(spec)
                    .await
                    .map_err(|e| connection_error(format!("subnet tunnel failed: {e:#}")))?;
                (target.endpoint.clone(), Some(tunnel))
            }
            Some(spec) if !options.subnet_tunnel => {
                let range = options
                    .port_range
                    .or(spec.port_range)
                    .unwrap_or(self.default_port_range);
                let port = find_free_port(&self.probe, range).await?;
                let tunnel = self
                    .launcher
                    .port_forward(spec, port, &target.endpoint)
                    .await
                    .map_err(|e| connection_error(format!("port forward failed: {e:#}")))?;
                (format!("localhost:{port}"), Some(tunnel))
            }
            _ => (target.endpoint.clone(), None),
        };

        match self.dial_with_retry(target, &endpoint).await {
            Ok(handle) => Ok(Connection {
                handle: Arc::new(handle),
                tunnel,
            }),
            Err(e) => {
                if let Some(mut tunnel) = tunnel {
                    if let Err(te) = tunnel.terminate().await {
                        warn!(controller = %target.name, error = %te, "failed to stop tunnel after dial failure");
                    }
                }
                Err(connection_error(e))
            }
        }
    }

    async fn dial_with_retry(&self, target: &TargetConfig, endpoint: &str) -> Result<D::Handle, String> {
        let policy = target.retry_policy();
        let attempts = policy.attempts();

        let dial = async {
            let mut last_error = anyhow!("no dial attempt was made");
            for attempt in 1..=attempts {
                debug!(controller = %target.name, endpoint, attempt, "dialing controller");
                match self.dialer.dial(target, endpoint).await {
                    Ok(handle) => return Ok(handle),
                    Err(e) => {
                        debug!(controller = %target.name, attempt, error = %e, "dial attempt failed");
                        last_error = e;
                    }
                }
                if attempt < attempts {
                    tokio::time::sleep(policy.wait()).await;
                }
            }
            Err(last_error)
        };

        match tokio::time::timeout(policy.timeout(), dial).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!(
                "dial timed out after {}s",
                policy.timeout().as_secs()
            )),
        }
    }
}

/// Picks a free local port from `range` in random order.
///
/// A port is free when nothing accepts connections on it. The port may still be
/// taken between this probe and the tunnel binding it.
///
/// # Errors
///
/// Returns [`SpellError::NoFreePort`] when every port in the range is busy.
pub async fn find_free_port(probe: &impl NetworkProbe, range: PortRange) -> Result<u16, SpellError> {
    let mut ports: Vec<u16> = range.ports().collect();
    ports.shuffle(&mut rand::thread_rng());
    for port in ports {
        // a probe error counts as busy
        if !probe
            .check_tcp_connectivity("127.0.0.1", port)
            .await
            .unwrap_or(true)
        {
            debug!(port, "free port found");
            return Ok(port);
        }
    }
    Err(SpellError::NoFreePort {
        start: range.start,
        end: range.end,
    })
}
