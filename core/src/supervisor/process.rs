//! Wrapped client supervision.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::signals::{RelaySignal, SignalRelay};
use crate::error::ProcessError;

/// Options for the wrapped client binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Client binary name or path.
    pub client_binary: PathBuf,
    /// Environment variable that carries the kubeconfig path.
    pub config_env_var: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            client_binary: PathBuf::from("kubectl"),
            config_env_var: "KUBECONFIG".to_string(),
        }
    }
}

/// Runs the wrapped client (or idles) against a derived kubeconfig.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    options: SupervisorOptions,
}

impl ProcessSupervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    /// Runs `argv` through the client binary and returns its exit code.
    ///
    /// With an empty `argv` this blocks until the relay yields a signal and
    /// returns 0.
    pub async fn run(
        &self,
        argv: &[String],
        config_path: &Path,
        relay: &mut SignalRelay,
    ) -> Result<i32, ProcessError> {
        if argv.is_empty() {
            return Ok(self.idle(relay).await);
        }
        self.supervise(argv, config_path, relay).await
    }

    async fn idle(&self, relay: &mut SignalRelay) -> i32 {
        info!("No command provided, keeping tunnel open. Press Ctrl+C to exit.");
        match relay.recv().await {
            Some(signal) => debug!(signal = ?signal, "Idle wait interrupted"),
            None => debug!("Signal relay closed"),
        }
        0
    }

    async fn supervise(
        &self,
        argv: &[String],
        config_path: &Path,
        relay: &mut SignalRelay,
    ) -> Result<i32, ProcessError> {
        let program = self.options.client_binary.display().to_string();

        let mut child = Command::new(&self.options.client_binary)
            .args(argv)
            .env(&self.options.config_env_var, config_path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(program = %program, pid = ?pid, "Started wrapped command");

        let mut relay_open = true;
        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|source| ProcessError::Wait {
                        program: program.clone(),
                        source,
                    })?;
                }
                signal = relay.recv(), if relay_open => match signal {
                    Some(signal) => forward_signal(pid, signal),
                    None => relay_open = false,
                },
            }
        };

        let code = exit_code(status);
        if code == 0 {
            debug!(program = %program, "Wrapped command finished");
        } else {
            warn!(program = %program, code = code, "Wrapped command failed");
        }
        Ok(code)
    }
}

/// Maps an exit status to a shell-style exit code.
///
/// Termination by signal N maps to `128 + N`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, signal: RelaySignal) {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };

    debug!(pid = pid, signal = ?signal, "Forwarding signal to wrapped command");
    match kill(Pid::from_raw(pid as i32), signal.as_nix()) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid = pid, error = %e, "Failed to forward signal"),
    }
}

#[cfg(not(unix))]
fn forward_signal(pid: Option<u32>, signal: RelaySignal) {
    // The console delivers Ctrl+C to the whole process group already.
    debug!(pid = ?pid, signal = ?signal, "Not forwarding signal on this platform");
}
