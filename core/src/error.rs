//! Error types for the kubetunnel-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for kubetunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a tunnel session.
///
/// Setup-phase errors abort the run; `Cleanup` only ever shows up inside a
/// [`RunReport`](crate::orchestrator::RunReport), never as the run result.
#[derive(Error, Debug)]
pub enum Error {
    /// Loading or navigating the kubeconfig failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The control-plane endpoint could not be parsed.
    #[error("Endpoint error: {0}")]
    Url(#[from] UrlError),

    /// No local port could be reserved for the tunnel.
    #[error("Port allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// The forwarding process could not be started or stopped.
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// The wrapped client could not be run.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// A best-effort cleanup step failed.
    #[error("Cleanup error: {0}")]
    Cleanup(#[from] CleanupError),
}

/// Kubeconfig loading and lookup errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No kubeconfig file could be located.
    #[error("No kubeconfig found (set KUBECONFIG or create ~/.kube/config)")]
    NotFound,

    /// The kubeconfig file could not be read.
    #[error("Failed to read kubeconfig {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The kubeconfig is not valid YAML.
    #[error("Failed to parse kubeconfig: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// `current-context` is missing or empty.
    #[error("No current context found")]
    NoActiveContext,

    /// The active context has no entry under `contexts`.
    #[error("Context {0} not found")]
    ContextNotFound(String),

    /// The active context references a cluster that does not exist.
    #[error("Cluster {0} not found")]
    ClusterNotFound(String),

    /// The settings file could not be read or parsed.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// The derived kubeconfig could not be persisted.
    #[error("Failed to write temporary kubeconfig: {0}")]
    Write(String),
}

/// Control-plane endpoint parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The server field is not an absolute URL with a host.
    #[error("Error parsing server URL {url:?}: {reason}")]
    Parse { url: String, reason: String },

    /// The server URL carries a port that is not a number in range.
    #[error("Error parsing port in server URL {0:?}")]
    Port(String),
}

/// Failure to obtain a free local port.
#[derive(Error, Debug)]
#[error("Failed to allocate a local port: {0}")]
pub struct AllocationError(#[from] pub std::io::Error);

/// Forwarding process lifecycle errors.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// `start` was called on a session that is not `Unstarted`.
    #[error("Tunnel is already running (state: {0})")]
    AlreadyRunning(String),

    /// The forwarding binary could not be spawned.
    #[error("Error starting SSH tunnel: {0}")]
    Spawn(#[source] std::io::Error),

    /// The forwarding process exited before the tunnel was ready.
    #[error("SSH tunnel exited before becoming ready ({0})")]
    ExitedEarly(String),

    /// The local endpoint never accepted a connection.
    #[error("SSH tunnel did not accept connections on port {port} after {attempts} attempts")]
    NotReady { port: u16, attempts: u32 },

    /// The termination signal could not be delivered.
    #[error("Error sending SIGTERM to SSH tunnel: {0}")]
    Stop(String),
}

/// Wrapped client errors.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The client binary could not be spawned.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the client failed.
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS signal subscription could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Best-effort cleanup failures, reported but never fatal.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// Stopping the tunnel failed.
    #[error("Error stopping tunnel: {0}")]
    Tunnel(#[from] TunnelError),

    /// Removing the derived kubeconfig failed.
    #[error("Failed to remove temporary kubeconfig {path}: {source}")]
    Release {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ConfigError::ClusterNotFound("prod".to_string()));
        assert!(err.to_string().contains("Cluster prod not found"));
        assert!(matches!(err, Error::Config(_)));

        let err = Error::from(TunnelError::AlreadyRunning("Running".to_string()));
        assert!(err.to_string().contains("already running"));

        let err = UrlError::Port("https://a.b:http".to_string());
        assert!(err.to_string().contains("a.b:http"));
    }
}
