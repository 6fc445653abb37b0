//! Connection registry: reuse, reconnect, tunnels and release.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use spell_cli::application::connection::{ConnectOptions, find_free_port};
use spell_cli::application::ports::ControllerApi;
use spell_cli::domain::{PortRange, SpellError};

use crate::mocks::{MockProbe, manager, manager_with_probe, target, tunnelled_target};

fn range(start: u16, end: u16) -> PortRange {
    PortRange { start, end }
}

#[tokio::test]
async fn test_get_connection_reuses_live_session() {
    let manager = manager();
    manager.dialer().add("alpha");
    let alpha = target("alpha");

    let first = manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");
    let second = manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.dialer().dial_count("alpha"), 1);
    assert_eq!(manager.len().await, 1);
    assert!(manager.is_registered("alpha").await);
}

#[tokio::test]
async fn test_get_connection_dials_direct_endpoint_without_tunnel() {
    let manager = manager();
    manager.dialer().add("alpha");

    manager
        .get_connection(&target("alpha"), ConnectOptions::default())
        .await
        .expect("connect");

    let dials = manager.dialer().dials.lock().unwrap().clone();
    assert_eq!(dials, [("alpha".to_string(), "10.1.1.99:17070".to_string())]);
}

#[tokio::test]
async fn test_get_connection_redials_when_session_dropped() {
    let manager = manager();
    let remote = manager.dialer().add("alpha");
    let alpha = target("alpha");

    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");
    remote.lock().unwrap().reachable = false;
    let handle = manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("reconnect");

    assert_eq!(manager.dialer().dial_count("alpha"), 2);
    assert_eq!(remote.lock().unwrap().disconnects, 1);
    remote.lock().unwrap().reachable = true;
    assert!(handle.is_connected().await);
}

#[tokio::test]
async fn test_reconnect_tears_down_old_tunnel() {
    let manager = manager();
    manager.dialer().add("alpha");
    let alpha = tunnelled_target("alpha", &[]);

    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");
    manager
        .get_connection(
            &alpha,
            ConnectOptions {
                reconnect: true,
                ..ConnectOptions::default()
            },
        )
        .await
        .expect("reconnect");

    let launcher = manager.launcher();
    assert_eq!(launcher.spawned(), 2);
    assert_eq!(launcher.terminated(), 1);
    assert_eq!(manager.len().await, 1);
}

#[tokio::test]
async fn test_dead_tunnel_forces_new_connection() {
    let manager = manager();
    manager.dialer().add("alpha");
    let alpha = tunnelled_target("alpha", &[]);

    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");
    manager.launcher().kill(0);
    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("reconnect");

    assert_eq!(manager.launcher().spawned(), 2);
    assert_eq!(manager.dialer().dial_count("alpha"), 2);
}

#[tokio::test]
async fn test_port_forward_dials_local_end() {
    let manager = manager();
    manager.dialer().add("alpha");

    manager
        .get_connection(&tunnelled_target("alpha", &[]), ConnectOptions::default())
        .await
        .expect("connect");

    let forwards = manager.launcher().forwards.lock().unwrap().clone();
    assert_eq!(forwards.len(), 1);
    let (destination, port, endpoint) = &forwards[0];
    assert_eq!(destination, "ubuntu@bastion");
    assert_eq!(endpoint, "10.1.1.99:17070");
    assert!((17071..17075).contains(port), "port {port} outside target range");

    let dials = manager.dialer().dials.lock().unwrap().clone();
    assert_eq!(dials[0].1, format!("localhost:{port}"));
}

#[tokio::test]
async fn test_caller_port_range_overrides_target_range() {
    let manager = manager();
    manager.dialer().add("alpha");

    manager
        .get_connection(
            &tunnelled_target("alpha", &[]),
            ConnectOptions {
                port_range: Some(range(20000, 20001)),
                ..ConnectOptions::default()
            },
        )
        .await
        .expect("connect");

    let forwards = manager.launcher().forwards.lock().unwrap().clone();
    assert_eq!(forwards[0].1, 20000);
}

#[tokio::test]
async fn test_default_port_range_applies_without_target_range() {
    let manager = manager().with_default_port_range(range(30000, 30001));
    manager.dialer().add("alpha");
    let mut alpha = tunnelled_target("alpha", &[]);
    alpha.connection.as_mut().unwrap().port_range = None;

    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect("connect");

    assert_eq!(manager.launcher().forwards.lock().unwrap()[0].1, 30000);
}

#[tokio::test]
async fn test_dial_failure_stops_new_tunnel() {
    let manager = manager();
    manager.dialer().fail("alpha");

    let err = manager
        .get_connection(&tunnelled_target("alpha", &[]), ConnectOptions::default())
        .await
        .expect_err("dial fails");

    assert!(matches!(err, SpellError::Connection { ref target, .. } if target == "alpha"));
    assert_eq!(manager.launcher().spawned(), 1);
    assert_eq!(manager.launcher().terminated(), 1);
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn test_dial_failure_reports_reason() {
    let manager = manager();
    manager.dialer().fail("alpha");

    let err = manager
        .get_connection(&target("alpha"), ConnectOptions::default())
        .await
        .expect_err("dial fails");

    assert!(err.to_string().contains("connection refused"), "got: {err}");
}

#[tokio::test]
async fn test_dial_retries_up_to_policy_attempts() {
    let manager = manager();
    manager.dialer().fail("alpha");
    let mut alpha = target("alpha");
    alpha.retry_policy.as_mut().unwrap().attempt = Some(3);

    manager
        .get_connection(&alpha, ConnectOptions::default())
        .await
        .expect_err("dial fails");

    assert_eq!(manager.dialer().dial_count("alpha"), 3);
}

#[tokio::test]
async fn test_all_ports_busy_is_no_free_port() {
    let probe = MockProbe {
        busy: (17071..17075).collect::<HashSet<_>>(),
    };
    let manager = manager_with_probe(probe);
    manager.dialer().add("alpha");

    let err = manager
        .get_connection(&tunnelled_target("alpha", &[]), ConnectOptions::default())
        .await
        .expect_err("no port");

    assert!(matches!(
        err,
        SpellError::NoFreePort {
            start: 17071,
            end: 17075
        }
    ));
    assert_eq!(manager.launcher().spawned(), 0);
    assert_eq!(manager.dialer().dial_count("alpha"), 0);
}

#[tokio::test]
async fn test_find_free_port_skips_busy_ports() {
    let probe = MockProbe {
        busy: [40000, 40001, 40003].into_iter().collect(),
    };

    let port = find_free_port(&probe, range(40000, 40004))
        .await
        .expect("free port");

    assert_eq!(port, 40002);
}

#[tokio::test]
async fn test_subnet_tunnel_dials_real_endpoint() {
    let manager = manager();
    manager.dialer().add("alpha");

    manager
        .get_connection(
            &tunnelled_target("alpha", &["10.1.0.0/16"]),
            ConnectOptions {
                subnet_tunnel: true,
                ..ConnectOptions::default()
            },
        )
        .await
        .expect("connect");

    let subnets = manager.launcher().subnet_tunnels.lock().unwrap().clone();
    assert_eq!(subnets, [vec!["10.1.0.0/16".to_string()]]);
    assert!(manager.launcher().forwards.lock().unwrap().is_empty());
    assert_eq!(manager.dialer().dials.lock().unwrap()[0].1, "10.1.1.99:17070");
}

#[tokio::test]
async fn test_release_all_disconnects_and_stops_tunnels() {
    let manager = manager();
    let alpha_remote = manager.dialer().add("alpha");
    let beta_remote = manager.dialer().add("beta");

    manager
        .get_connection(&target("alpha"), ConnectOptions::default())
        .await
        .expect("connect");
    manager
        .get_connection(&tunnelled_target("beta", &[]), ConnectOptions::default())
        .await
        .expect("connect");

    let errors = manager.release_all().await;

    assert!(errors.is_empty());
    assert!(manager.is_empty().await);
    assert_eq!(alpha_remote.lock().unwrap().disconnects, 1);
    assert_eq!(beta_remote.lock().unwrap().disconnects, 1);
    assert_eq!(manager.launcher().terminated(), 1);
}

#[tokio::test]
async fn test_release_all_on_empty_registry_is_noop() {
    let manager = manager();
    assert!(manager.release_all().await.is_empty());
}

#[tokio::test]
async fn test_release_all_continues_past_failed_disconnect() {
    let manager = manager();
    let alpha_remote = manager.dialer().add("alpha");
    let beta_remote = manager.dialer().add("beta");
    let gamma_remote = manager.dialer().add("gamma");
    beta_remote.lock().unwrap().disconnect_fails = true;

    for name in ["alpha", "beta", "gamma"] {
        manager
            .get_connection(&tunnelled_target(name, &[]), ConnectOptions::default())
            .await
            .expect("connect");
    }

    let errors = manager.release_all().await;

    assert_eq!(errors.len(), 1, "got: {errors:?}");
    assert!(matches!(&errors[0], SpellError::Connection { target, .. } if target == "beta"));
    assert!(manager.is_empty().await);
    for remote in [&alpha_remote, &beta_remote, &gamma_remote] {
        assert_eq!(remote.lock().unwrap().disconnects, 1);
    }
    assert_eq!(manager.launcher().terminated(), 3);
    let tunnels = manager.launcher().tunnels.lock().unwrap().clone();
    assert!(tunnels.iter().all(|alive| !alive.load(Ordering::SeqCst)));
}

#[tokio::test]
async fn test_release_all_reports_tunnel_that_will_not_stop() {
    let manager = manager();
    let alpha_remote = manager.dialer().add("alpha");
    manager.dialer().add("beta");

    manager
        .get_connection(&tunnelled_target("alpha", &[]), ConnectOptions::default())
        .await
        .expect("connect");
    manager.launcher().stubborn.store(true, Ordering::SeqCst);
    manager
        .get_connection(&tunnelled_target("beta", &[]), ConnectOptions::default())
        .await
        .expect("connect");

    let errors = manager.release_all().await;

    assert_eq!(errors.len(), 1, "got: {errors:?}");
    assert!(matches!(&errors[0], SpellError::Connection { target, .. } if target == "beta"));
    assert!(errors[0].to_string().contains("did not exit"), "got: {}", errors[0]);
    assert_eq!(alpha_remote.lock().unwrap().disconnects, 1);
    assert!(manager.is_empty().await);
}
