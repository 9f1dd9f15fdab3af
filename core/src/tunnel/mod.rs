//! SSH tunnel lifecycle.
//!
//! This module provides:
//! - The tunnel state machine and its options
//! - Launching and terminating the `ssh -L` forwarding process

pub mod models;
pub mod session;

// Re-export commonly used types
pub use models::{Readiness, TunnelOptions, TunnelState};
pub use session::TunnelSession;
