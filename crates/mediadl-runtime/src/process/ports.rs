//! Port availability checks.

use std::net::TcpListener;

use anyhow::{Result, bail};
use tracing::debug;

/// Check if a port is available by attempting to bind to it.
/// The listener is dropped right away, which releases the port.
pub fn is_port_available(host: &str, port: u16) -> bool {
    match TcpListener::bind((host, port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(e) => {
            debug!(host, port, error = %e, "Port bind probe failed");
            false
        }
    }
}

/// Error naming the port if something else is bound to it.
pub fn ensure_port_available(host: &str, port: u16) -> Result<()> {
    if !is_port_available(host, port) {
        bail!("Port {port} on {host} is already in use");
    }
    Ok(())
}
