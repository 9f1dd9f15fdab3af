//! Run orchestration.
//!
//! Sequence: resolve endpoint → allocate port → start tunnel → materialize
//! kubeconfig → run client. Teardown happens in reverse acquisition order
//! (derived kubeconfig first, tunnel last) on every path out of the run, and
//! teardown failures are collected without replacing the run's result.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{CleanupError, Result};
use crate::kubeconfig::{materialize, resolve, ClusterEndpoint, RawConfig};
use crate::port::allocate_free_port;
use crate::supervisor::{ProcessSupervisor, SignalRelay, SupervisorOptions};
use crate::tunnel::{TunnelOptions, TunnelSession, TunnelState};

/// Details handed to the ready hook once the derived kubeconfig exists.
#[derive(Debug, Clone, Copy)]
pub struct ReadyInfo<'a> {
    pub config_path: &'a Path,
    pub local_port: u16,
    pub endpoint: &'a ClusterEndpoint,
    /// True when no command was given and the run waits for a signal.
    pub idle: bool,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Exit code of the wrapped command, or 0 for an idle session.
    pub exit_code: i32,
    /// Tunnel state after teardown.
    pub tunnel_state: TunnelState,
    /// Teardown failures, already logged.
    pub cleanup_errors: Vec<CleanupError>,
}

type ReadyHook = Box<dyn Fn(&ReadyInfo<'_>) + Send + Sync>;

/// Drives one tunnelled run.
pub struct Orchestrator {
    tunnel: TunnelOptions,
    supervisor: ProcessSupervisor,
    on_ready: Option<ReadyHook>,
}

impl Orchestrator {
    pub fn new(tunnel: TunnelOptions, supervisor: SupervisorOptions) -> Self {
        Self {
            tunnel,
            supervisor: ProcessSupervisor::new(supervisor),
            on_ready: None,
        }
    }

    /// Registers a callback invoked once the tunnel and kubeconfig are ready.
    pub fn on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReadyInfo<'_>) + Send + Sync + 'static,
    {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Runs `argv` through a freshly established tunnel.
    ///
    /// Setup errors are returned as-is after teardown; no tunnel is created
    /// if the endpoint cannot be resolved.
    pub async fn run(
        &self,
        raw: &RawConfig,
        argv: &[String],
        relay: &mut SignalRelay,
    ) -> Result<RunReport> {
        let endpoint = resolve(raw)?;
        let local_port = allocate_free_port()?;

        let mut tunnel = TunnelSession::new(local_port, endpoint, self.tunnel.clone());
        let mut cleanup_errors = Vec::new();

        let outcome = self
            .run_tunneled(&mut tunnel, raw, argv, relay, &mut cleanup_errors)
            .await;

        if let Err(e) = tunnel.stop().await {
            warn!(error = %e, "Error stopping tunnel");
            cleanup_errors.push(e.into());
        }

        let exit_code = outcome?;
        info!(exit_code = exit_code, "Run finished");

        Ok(RunReport {
            exit_code,
            tunnel_state: tunnel.state(),
            cleanup_errors,
        })
    }

    async fn run_tunneled(
        &self,
        tunnel: &mut TunnelSession,
        raw: &RawConfig,
        argv: &[String],
        relay: &mut SignalRelay,
        cleanup_errors: &mut Vec<CleanupError>,
    ) -> Result<i32> {
        tunnel.start().await?;

        let mut derived = materialize(raw, tunnel.local_port())?;

        if let Some(hook) = &self.on_ready {
            hook(&ReadyInfo {
                config_path: derived.path(),
                local_port: tunnel.local_port(),
                endpoint: tunnel.remote(),
                idle: argv.is_empty(),
            });
        }

        let result = self.supervisor.run(argv, derived.path(), relay).await;

        if let Err(e) = derived.release() {
            warn!(error = %e, "Error removing temporary kubeconfig");
            cleanup_errors.push(e);
        }

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use crate::kubeconfig::document::tests::SAMPLE;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_cluster_creates_nothing() {
        let yaml = SAMPLE.replace("current-context: prod", "current-context: dangling");
        let raw = RawConfig::from_yaml_str(&yaml).unwrap();

        let ready = Arc::new(AtomicBool::new(false));
        let flag = ready.clone();
        let orchestrator = Orchestrator::new(
            TunnelOptions {
                // Never spawned: resolution fails first.
                ssh_binary: "/nonexistent/ssh".into(),
                ..TunnelOptions::default()
            },
            SupervisorOptions::default(),
        )
        .on_ready(move |_| flag.store(true, Ordering::SeqCst));

        let (mut relay, _trigger) = SignalRelay::manual();
        let err = orchestrator.run(&raw, &[], &mut relay).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::ClusterNotFound(_))
        ));
        assert!(!ready.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_tunnel_start_failure_is_primary_error() {
        let raw = RawConfig::from_yaml_str(SAMPLE).unwrap();
        let orchestrator = Orchestrator::new(
            TunnelOptions {
                ssh_binary: "/nonexistent/ssh".into(),
                ..TunnelOptions::default()
            },
            SupervisorOptions::default(),
        );

        let (mut relay, _trigger) = SignalRelay::manual();
        let err = orchestrator.run(&raw, &[], &mut relay).await.unwrap_err();
        assert!(matches!(err, Error::Tunnel(_)));
    }
}
