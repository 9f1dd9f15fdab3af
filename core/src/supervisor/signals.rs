//! Run-scoped signal subscription.
//!
//! A [`SignalRelay`] is created by whoever drives a run and dropped when the
//! run is over, so signals are only observed while a run is in progress.
//! tokio keeps its OS-level handler installed for the rest of the process
//! once [`SignalRelay::os`] has been called; after the relay is dropped
//! SIGINT and SIGTERM are absorbed instead of terminating the process.
//! The manual variant lets an embedding host (or a test) inject signals
//! through a channel.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ProcessError;

/// A termination request received by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelaySignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

#[cfg(unix)]
impl RelaySignal {
    /// The matching OS signal.
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            RelaySignal::Interrupt => nix::sys::signal::Signal::SIGINT,
            RelaySignal::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

enum Source {
    #[cfg(unix)]
    Os {
        interrupt: tokio::signal::unix::Signal,
        terminate: tokio::signal::unix::Signal,
    },
    #[cfg(not(unix))]
    CtrlC,
    Manual(mpsc::UnboundedReceiver<RelaySignal>),
}

/// Subscription to interrupt and termination signals for one run.
pub struct SignalRelay {
    source: Source,
}

/// Sending half of a manual relay.
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    tx: mpsc::UnboundedSender<RelaySignal>,
}

impl SignalTrigger {
    /// Delivers a signal to the relay. Returns false if the relay is gone.
    pub fn send(&self, signal: RelaySignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

impl SignalRelay {
    /// Subscribes to SIGINT and SIGTERM.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn os() -> Result<Self, ProcessError> {
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt = signal(SignalKind::interrupt()).map_err(ProcessError::Signal)?;
        let terminate = signal(SignalKind::terminate()).map_err(ProcessError::Signal)?;
        debug!("Subscribed to SIGINT and SIGTERM");

        Ok(Self {
            source: Source::Os {
                interrupt,
                terminate,
            },
        })
    }

    /// Subscribes to Ctrl+C.
    #[cfg(not(unix))]
    pub fn os() -> Result<Self, ProcessError> {
        debug!("Subscribed to Ctrl+C");
        Ok(Self {
            source: Source::CtrlC,
        })
    }

    /// Creates a relay fed by the returned trigger.
    pub fn manual() -> (Self, SignalTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source: Source::Manual(rx),
            },
            SignalTrigger { tx },
        )
    }

    /// Waits for the next signal.
    ///
    /// Returns `None` once no further signal can arrive.
    pub async fn recv(&mut self) -> Option<RelaySignal> {
        match &mut self.source {
            #[cfg(unix)]
            Source::Os {
                interrupt,
                terminate,
            } => {
                tokio::select! {
                    received = interrupt.recv() => received.map(|()| RelaySignal::Interrupt),
                    received = terminate.recv() => received.map(|()| RelaySignal::Terminate),
                }
            }
            #[cfg(not(unix))]
            Source::CtrlC => tokio::signal::ctrl_c()
                .await
                .ok()
                .map(|()| RelaySignal::Interrupt),
            Source::Manual(rx) => rx.recv().await,
        }
    }
}

impl std::fmt::Debug for SignalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.source {
            #[cfg(unix)]
            Source::Os { .. } => "os",
            #[cfg(not(unix))]
            Source::CtrlC => "os",
            Source::Manual(_) => "manual",
        };
        f.debug_struct("SignalRelay").field("source", &kind).finish()
    }
}
