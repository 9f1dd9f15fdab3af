//! SSH tunnel session.
//!
//! A session owns exactly one `ssh -N -L` process. State is tracked with an
//! explicit [`TunnelState`]; the child handle is only held while the state is
//! `Starting`, `Running` or `Stopping`.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::models::{Readiness, TunnelOptions, TunnelState};
use crate::error::TunnelError;
use crate::kubeconfig::ClusterEndpoint;
use crate::port::is_port_open;

/// A local-to-remote port forward through ssh.
#[derive(Debug)]
pub struct TunnelSession {
    local_port: u16,
    remote: ClusterEndpoint,
    options: TunnelOptions,
    state: TunnelState,
    child: Option<Child>,
}

impl TunnelSession {
    /// Creates an unstarted session forwarding `local_port` to `remote`.
    pub fn new(local_port: u16, remote: ClusterEndpoint, options: TunnelOptions) -> Self {
        Self {
            local_port,
            remote,
            options,
            state: TunnelState::Unstarted,
            child: None,
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote(&self) -> &ClusterEndpoint {
        &self.remote
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// PID of the forwarding process, if one is held.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// The ssh destination, `user@host` or `host`.
    pub fn destination(&self) -> String {
        let host = self
            .options
            .ssh_host
            .as_deref()
            .unwrap_or(&self.remote.host);

        match &self.options.ssh_user {
            Some(user) if !user.is_empty() => format!("{}@{}", user, host),
            _ => host.to_string(),
        }
    }

    /// Arguments passed to the ssh binary.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "-N".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
        ];

        if let Some(port) = self.options.ssh_port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.push("-L".to_string());
        args.push(format!(
            "{}:{}:{}:{}",
            self.options.bind_address, self.local_port, self.options.forward_host, self.remote.port
        ));

        args.extend(self.options.extra_args.iter().cloned());
        args.push(self.destination());
        args
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Launches the forwarding process and waits for it to become ready.
    ///
    /// Only valid from `Unstarted`.
    pub async fn start(&mut self) -> Result<(), TunnelError> {
        if self.state != TunnelState::Unstarted {
            return Err(TunnelError::AlreadyRunning(self.state.to_string()));
        }

        self.state = TunnelState::Starting;
        info!(
            local_port = self.local_port,
            destination = %self.destination(),
            remote_port = self.remote.port,
            "Starting SSH tunnel"
        );

        let child = Command::new(&self.options.ssh_binary)
            .args(self.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) if child.id().is_some() => child,
            Ok(_) => {
                self.state = TunnelState::Failed;
                return Err(TunnelError::ExitedEarly(
                    "process handle unavailable".to_string(),
                ));
            }
            Err(e) => {
                self.state = TunnelState::Failed;
                return Err(TunnelError::Spawn(e));
            }
        };
        self.child = Some(child);

        if let Err(e) = self.wait_ready().await {
            warn!(error = %e, "SSH tunnel failed to come up");
            if let Some(mut child) = self.child.take() {
                let _ = child.kill().await;
            }
            self.state = TunnelState::Failed;
            return Err(e);
        }

        self.state = TunnelState::Running;
        info!(local_port = self.local_port, "SSH tunnel running");
        Ok(())
    }

    /// Terminates the forwarding process.
    ///
    /// A no-op when nothing is running. Local state always ends in `Stopped`
    /// once a process was held, even when the termination signal fails.
    pub async fn stop(&mut self) -> Result<(), TunnelError> {
        let Some(mut child) = self.child.take() else {
            if self.state.has_process() {
                self.state = TunnelState::Stopped;
            }
            return Ok(());
        };

        self.state = TunnelState::Stopping;
        info!("Stopping SSH tunnel");

        let result = terminate(&mut child, self.options.stop_timeout).await;
        self.state = TunnelState::Stopped;
        result
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    async fn wait_ready(&mut self) -> Result<(), TunnelError> {
        match self.options.readiness {
            Readiness::Settle(interval) => {
                sleep(interval).await;
                self.check_alive()
            }
            Readiness::Probe { attempts, interval } => {
                for attempt in 1..=attempts {
                    self.check_alive()?;
                    if is_port_open(self.local_port).await {
                        debug!(attempt = attempt, "SSH tunnel accepted connection");
                        return Ok(());
                    }
                    sleep(interval).await;
                }
                Err(TunnelError::NotReady {
                    port: self.local_port,
                    attempts,
                })
            }
        }
    }

    fn check_alive(&mut self) -> Result<(), TunnelError> {
        let Some(child) = self.child.as_mut() else {
            return Err(TunnelError::ExitedEarly("no process".to_string()));
        };

        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(TunnelError::ExitedEarly(status.to_string())),
            Err(e) => Err(TunnelError::ExitedEarly(e.to_string())),
        }
    }
}

/// Sends SIGTERM, waits up to `grace`, then force-kills.
async fn terminate(child: &mut Child, grace: Duration) -> Result<(), TunnelError> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(status = %status, "SSH tunnel already exited");
        return Ok(());
    }

    if let Err(e) = send_terminate(child) {
        let _ = child.start_kill();
        let _ = child.wait().await;
        return Err(e);
    }

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(status = %status, "SSH tunnel exited"),
        Ok(Err(e)) => warn!(error = %e, "Failed to wait for SSH tunnel"),
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "SSH tunnel ignored SIGTERM, killing"
            );
            let _ = child.kill().await;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> Result<(), TunnelError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid = pid, "SSH tunnel already gone");
            Ok(())
        }
        Err(e) => Err(TunnelError::Stop(e.to_string())),
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> Result<(), TunnelError> {
    child
        .start_kill()
        .map_err(|e| TunnelError::Stop(e.to_string()))
}
