//! Local port allocation for the tunnel's listening side.
//!
//! The port is probed by binding a transient listener to an OS-chosen port
//! and closing it again. Nothing holds the port afterwards, so another process
//! can in principle take it before the forwarding binary binds; that race is
//! accepted because the forwarding binary, not this crate, performs the bind.

use std::net::{Ipv4Addr, TcpListener};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::AllocationError;

/// Timeout for a single local connection probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Obtains an available local TCP port.
///
/// The probing socket is closed before this returns.
pub fn allocate_free_port() -> Result<u16, AllocationError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);

    debug!(port = port, "Allocated local port");
    Ok(port)
}

/// Checks if a port is open (something is listening on loopback).
pub async fn is_port_open(port: u16) -> bool {
    matches!(
        timeout(PROBE_TIMEOUT, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_free_port_in_range() {
        let port = allocate_free_port().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn test_allocated_port_is_released() {
        let port = allocate_free_port().unwrap();

        // The allocator must not keep the socket: binding the same port again succeeds.
        let rebind = TcpListener::bind((Ipv4Addr::LOCALHOST, port));
        assert!(rebind.is_ok());
    }

    #[tokio::test]
    async fn test_is_port_open() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_open(port).await);

        drop(listener);
        assert!(!is_port_open(port).await);
    }
}
