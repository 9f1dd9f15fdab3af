//! kubectl-tunnel Core Library
//!
//! Reaches a Kubernetes control plane that is only reachable through SSH.
//! Provides functionality to:
//! - Resolve the active cluster's API server from a kubeconfig
//! - Run an `ssh -L` forward to it on a free local port
//! - Write a derived kubeconfig pointing at the forward
//! - Run `kubectl` against it, relaying termination signals
//!
//! Teardown is ordered and always attempted: the derived kubeconfig is
//! removed, then the tunnel is stopped.

pub mod error;
pub mod kubeconfig;
pub mod orchestrator;
pub mod port;
pub mod settings;
pub mod supervisor;
pub mod tunnel;

// Re-export commonly used types
pub use error::{Error, Result};
pub use kubeconfig::{ClusterEndpoint, DerivedConfig, RawConfig};
pub use orchestrator::{Orchestrator, ReadyInfo, RunReport};
pub use settings::{Settings, SettingsStore};
pub use supervisor::{ProcessSupervisor, RelaySignal, SignalRelay, SupervisorOptions};
pub use tunnel::{Readiness, TunnelOptions, TunnelSession, TunnelState};
