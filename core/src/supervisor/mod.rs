//! Wrapped command supervision and signal relay.

pub mod process;
pub mod signals;

pub use process::{exit_code, ProcessSupervisor, SupervisorOptions};
pub use signals::{RelaySignal, SignalRelay, SignalTrigger};
