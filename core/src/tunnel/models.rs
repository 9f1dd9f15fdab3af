//! Tunnel state and configuration models.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default settle interval before the tunnel is considered up.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Default bounded wait for the forwarding process to exit after SIGTERM.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of readiness probes in probe mode.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 20;

/// Default delay between readiness probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Lifecycle state of a tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl TunnelState {
    /// Returns true while a forwarding process may exist.
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            TunnelState::Starting | TunnelState::Running | TunnelState::Stopping
        )
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunnelState::Unstarted => "Unstarted",
            TunnelState::Starting => "Starting",
            TunnelState::Running => "Running",
            TunnelState::Stopping => "Stopping",
            TunnelState::Stopped => "Stopped",
            TunnelState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// How `start` decides the tunnel is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Wait a fixed interval, then check the process is still alive.
    Settle(Duration),
    /// Poll the local port until it accepts a connection.
    Probe { attempts: u32, interval: Duration },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Settle(DEFAULT_SETTLE)
    }
}

/// Options for the external ssh forwarding process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelOptions {
    /// ssh binary name or path.
    pub ssh_binary: PathBuf,
    /// Remote login user.
    pub ssh_user: Option<String>,
    /// ssh destination host; defaults to the cluster endpoint host.
    pub ssh_host: Option<String>,
    /// ssh port on the destination.
    pub ssh_port: Option<u16>,
    /// Private key passed with `-i`.
    pub identity_file: Option<PathBuf>,
    /// Extra arguments inserted before the destination.
    pub extra_args: Vec<String>,
    /// Host the remote side forwards to.
    pub forward_host: String,
    /// Local bind address of the forward.
    pub bind_address: String,
    pub readiness: Readiness,
    pub stop_timeout: Duration,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            ssh_binary: PathBuf::from("ssh"),
            ssh_user: None,
            ssh_host: None,
            ssh_port: None,
            identity_file: None,
            extra_args: Vec::new(),
            forward_host: "localhost".to_string(),
            bind_address: "localhost".to_string(),
            readiness: Readiness::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}
