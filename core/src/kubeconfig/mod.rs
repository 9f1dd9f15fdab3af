//! Kubeconfig handling.
//!
//! This module provides:
//! - Locating and loading the user's kubeconfig
//! - Resolving the active cluster's control-plane endpoint
//! - Materializing a derived kubeconfig that points at the local tunnel

pub mod document;
pub mod locate;
pub mod materializer;
pub mod resolver;

// Re-export commonly used types
pub use document::RawConfig;
pub use locate::locate_kubeconfig;
pub use materializer::{local_server_url, materialize, DerivedConfig};
pub use resolver::{parse_endpoint, resolve, ClusterEndpoint};
