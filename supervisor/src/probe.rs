//! Readiness probes.
//!
//! A probe only strengthens the startup ordering; a probe that never succeeds
//! is logged and startup carries on.

use crate::service::ReadinessProbe;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-attempt connect timeout floor.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll `probe.tcp` until a connection succeeds or `probe.timeout` elapses.
///
/// Returns whether the service became ready.
pub async fn wait_ready(service: &str, probe: &ReadinessProbe) -> bool {
    let deadline = Instant::now() + probe.timeout;
    let connect_timeout = probe.interval.max(MIN_CONNECT_TIMEOUT);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match tokio::time::timeout(connect_timeout, TcpStream::connect(&probe.tcp)).await {
            Ok(Ok(_)) => {
                info!(service = %service, addr = %probe.tcp, attempts, "Service is ready");
                return true;
            }
            Ok(Err(e)) => debug!(service = %service, addr = %probe.tcp, error = %e, "Not ready yet"),
            Err(_) => debug!(service = %service, addr = %probe.tcp, "Connect attempt timed out"),
        }

        if Instant::now() + probe.interval >= deadline {
            warn!(
                service = %service,
                addr = %probe.tcp,
                timeout = ?probe.timeout,
                "Readiness probe timed out, continuing startup"
            );
            return false;
        }
        tokio::time::sleep(probe.interval).await;
    }
}
