//! End-to-end tests for tunnel lifecycle and orchestrated runs.
//!
//! A small shell script stands in for `ssh` so no network access is needed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kubetunnel_core::error::{CleanupError, TunnelError};
use kubetunnel_core::{
    ClusterEndpoint, Orchestrator, RawConfig, Readiness, RelaySignal, SignalRelay,
    SupervisorOptions, TunnelOptions, TunnelSession, TunnelState,
};
use tempfile::TempDir;

const KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
current-context: edge
clusters:
- name: edge-cluster
  cluster:
    server: https://192.168.50.10:6443
    insecure-skip-tls-verify: true
contexts:
- name: edge
  context:
    cluster: edge-cluster
    user: edge-admin
users:
- name: edge-admin
  user:
    token: secret
"#;

/// Writes an executable script that ignores its arguments.
fn fake_ssh(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-ssh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn options(ssh_binary: PathBuf) -> TunnelOptions {
    TunnelOptions {
        ssh_binary,
        readiness: Readiness::Settle(Duration::from_millis(100)),
        stop_timeout: Duration::from_millis(500),
        ..TunnelOptions::default()
    }
}

fn endpoint() -> ClusterEndpoint {
    ClusterEndpoint {
        host: "192.168.50.10".to_string(),
        port: 6443,
        scheme: "https".to_string(),
    }
}

#[tokio::test]
async fn test_tunnel_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let mut tunnel = TunnelSession::new(40200, endpoint(), options(ssh));

    assert_eq!(tunnel.state(), TunnelState::Unstarted);
    tunnel.start().await.unwrap();
    assert_eq!(tunnel.state(), TunnelState::Running);
    assert!(tunnel.pid().is_some());

    let err = tunnel.start().await.unwrap_err();
    assert!(matches!(err, TunnelError::AlreadyRunning(_)));
    assert_eq!(tunnel.state(), TunnelState::Running);

    tunnel.stop().await.unwrap();
    assert_eq!(tunnel.state(), TunnelState::Stopped);
    assert!(tunnel.pid().is_none());

    // Second stop: same terminal state, no error.
    tunnel.stop().await.unwrap();
    assert_eq!(tunnel.state(), TunnelState::Stopped);
}

#[tokio::test]
async fn test_tunnel_ignoring_sigterm_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "trap '' TERM\nwhile :; do sleep 1; done");
    let mut tunnel = TunnelSession::new(40201, endpoint(), options(ssh));

    tunnel.start().await.unwrap();
    tunnel.stop().await.unwrap();
    assert_eq!(tunnel.state(), TunnelState::Stopped);
}

#[tokio::test]
async fn test_tunnel_exiting_during_settle_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exit 255");
    let mut tunnel = TunnelSession::new(
        40202,
        endpoint(),
        TunnelOptions {
            readiness: Readiness::Settle(Duration::from_millis(400)),
            ..options(ssh)
        },
    );

    let err = tunnel.start().await.unwrap_err();
    assert!(matches!(err, TunnelError::ExitedEarly(_)));
    assert_eq!(tunnel.state(), TunnelState::Failed);
}

#[tokio::test]
async fn test_probe_gives_up_when_nothing_listens() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let port = kubetunnel_core::port::allocate_free_port().unwrap();
    let mut tunnel = TunnelSession::new(
        port,
        endpoint(),
        TunnelOptions {
            readiness: Readiness::Probe {
                attempts: 3,
                interval: Duration::from_millis(50),
            },
            ..options(ssh)
        },
    );

    let err = tunnel.start().await.unwrap_err();
    assert!(matches!(err, TunnelError::NotReady { attempts: 3, .. }));
    assert_eq!(tunnel.state(), TunnelState::Failed);
    assert!(tunnel.pid().is_none());
}

/// Records the derived kubeconfig path seen by the ready hook.
fn capture_path(orchestrator: Orchestrator) -> (Orchestrator, Arc<Mutex<Option<PathBuf>>>) {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let orchestrator = orchestrator.on_ready(move |info| {
        assert!(info.config_path.exists());
        *slot.lock().unwrap() = Some(info.config_path.to_path_buf());
    });
    (orchestrator, seen)
}

fn seen_path(seen: &Arc<Mutex<Option<PathBuf>>>) -> PathBuf {
    seen.lock().unwrap().clone().expect("ready hook was not called")
}

#[tokio::test]
async fn test_idle_run_until_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let raw = RawConfig::from_yaml_str(KUBECONFIG).unwrap();

    let (mut relay, trigger) = SignalRelay::manual();
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let orchestrator = Orchestrator::new(options(ssh), SupervisorOptions::default()).on_ready(
        move |info| {
            assert!(info.idle);
            assert!(info.config_path.exists());
            assert_eq!(info.endpoint.port, 6443);
            *slot.lock().unwrap() = Some(info.config_path.to_path_buf());
            trigger.send(RelaySignal::Interrupt);
        },
    );

    let report = orchestrator.run(&raw, &[], &mut relay).await.unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.tunnel_state, TunnelState::Stopped);
    assert!(report.cleanup_errors.is_empty());
    assert!(!seen_path(&seen).exists());
}

#[tokio::test]
async fn test_wrapped_command_sees_derived_config() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let raw = RawConfig::from_yaml_str(KUBECONFIG).unwrap();

    let (orchestrator, seen) = capture_path(Orchestrator::new(
        options(ssh),
        SupervisorOptions {
            client_binary: PathBuf::from("sh"),
            ..SupervisorOptions::default()
        },
    ));

    // Exit 7 only if the file exists and points at the local tunnel.
    let script = r#"test -f "$KUBECONFIG" || exit 1
grep -q 'https://localhost:' "$KUBECONFIG" || exit 2
grep -q '192.168.50.10' "$KUBECONFIG" && exit 3
grep -q 'secret' "$KUBECONFIG" || exit 4
exit 7"#;
    let argv = vec!["-c".to_string(), script.to_string()];

    let (mut relay, _trigger) = SignalRelay::manual();
    let report = orchestrator.run(&raw, &argv, &mut relay).await.unwrap();

    assert_eq!(report.exit_code, 7);
    assert_eq!(report.tunnel_state, TunnelState::Stopped);
    assert!(!seen_path(&seen).exists());
}

#[tokio::test]
async fn test_echo_command() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let raw = RawConfig::from_yaml_str(KUBECONFIG).unwrap();

    let (orchestrator, seen) = capture_path(Orchestrator::new(
        options(ssh),
        SupervisorOptions {
            client_binary: PathBuf::from("echo"),
            ..SupervisorOptions::default()
        },
    ));

    let (mut relay, _trigger) = SignalRelay::manual();
    let report = orchestrator
        .run(&raw, &["hi".to_string()], &mut relay)
        .await
        .unwrap();

    assert_eq!(report.exit_code, 0);
    assert!(!seen_path(&seen).exists());
}

#[tokio::test]
async fn test_missing_client_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let raw = RawConfig::from_yaml_str(KUBECONFIG).unwrap();

    let (orchestrator, seen) = capture_path(Orchestrator::new(
        options(ssh),
        SupervisorOptions {
            client_binary: PathBuf::from("/nonexistent/kubectl"),
            ..SupervisorOptions::default()
        },
    ));

    let (mut relay, _trigger) = SignalRelay::manual();
    let err = orchestrator
        .run(&raw, &["get".to_string(), "pods".to_string()], &mut relay)
        .await
        .unwrap_err();

    assert!(matches!(err, kubetunnel_core::Error::Process(_)));
    assert!(!seen_path(&seen).exists());
}

#[tokio::test]
async fn test_cleanup_failure_does_not_replace_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = fake_ssh(&dir, "exec sleep 30");
    let raw = RawConfig::from_yaml_str(KUBECONFIG).unwrap();

    let orchestrator = Orchestrator::new(
        options(ssh),
        SupervisorOptions {
            client_binary: PathBuf::from("sh"),
            ..SupervisorOptions::default()
        },
    );

    // The command deletes the derived kubeconfig, so releasing it fails.
    let argv = vec!["-c".to_string(), r#"rm -f "$KUBECONFIG"; exit 5"#.to_string()];

    let (mut relay, _trigger) = SignalRelay::manual();
    let report = orchestrator.run(&raw, &argv, &mut relay).await.unwrap();

    assert_eq!(report.exit_code, 5);
    assert_eq!(report.tunnel_state, TunnelState::Stopped);
    assert_eq!(report.cleanup_errors.len(), 1);
    assert!(matches!(
        report.cleanup_errors[0],
        CleanupError::Release { .. }
    ));
}
