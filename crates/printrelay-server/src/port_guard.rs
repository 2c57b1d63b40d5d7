// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Port Guard: makes sure the listening port is free before the relay binds.
//
// A copy of this server left behind by a crash or a second launch is the
// usual culprit. Such stale instances are terminated; anything else holding
// the port is reported and never touched.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use printrelay_core::error::PortError;
use printrelay_core::types::PortConflict;

use crate::process::ProcessInspector;

/// Wait after terminating a stale instance before probing again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Reclaim attempts before giving up on a stubborn stale instance.
pub const DEFAULT_RETRIES: u32 = 1;

pub struct PortGuard {
    bind_ip: IpAddr,
    inspector: Arc<dyn ProcessInspector>,
    reclaim: bool,
    retries: u32,
    retry_delay: Duration,
}

impl PortGuard {
    pub fn new(bind_ip: IpAddr, inspector: Arc<dyn ProcessInspector>) -> Self {
        Self {
            bind_ip,
            inspector,
            reclaim: true,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Whether stale instances may be terminated.
    pub fn with_reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// `true` when `port` is currently bound on our interface.
    ///
    /// Binds and immediately releases the address. Only "address in use"
    /// counts as busy; other failures are left for the real bind to report.
    pub fn probe(&self, port: u16) -> bool {
        match TcpListener::bind(SocketAddr::new(self.bind_ip, port)) {
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::AddrInUse => true,
            Err(e) => {
                debug!(port, error = %e, "port probe failed; leaving it to bind");
                false
            }
        }
    }

    /// Make `port` bindable, reclaiming it from a stale instance if needed.
    pub async fn ensure_available(&self, port: u16) -> Result<(), PortError> {
        let mut attempts = 0;
        loop {
            if !self.probe(port) {
                return Ok(());
            }

            let holder = self.lookup(port).await;
            let Some(conflict) = holder else {
                warn!(port, "port is in use by an unidentified process");
                return Err(PortError::Busy { port, holder: None });
            };

            if !self.reclaim || !self.inspector.is_stale_instance(&conflict) {
                warn!(port, holder = %conflict, "port is held by another application");
                return Err(PortError::Busy {
                    port,
                    holder: Some(conflict),
                });
            }

            if attempts >= self.retries {
                warn!(port, holder = %conflict, attempts, "stale instance still holds the port");
                return Err(PortError::Busy {
                    port,
                    holder: Some(conflict),
                });
            }
            attempts += 1;

            info!(port, holder = %conflict, "terminating stale instance");
            let terminated = self.terminate(conflict.pid).await;
            if !terminated {
                warn!(port, pid = conflict.pid, "stale instance did not exit");
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn lookup(&self, port: u16) -> Option<PortConflict> {
        let inspector = Arc::clone(&self.inspector);
        tokio::task::spawn_blocking(move || inspector.listener_on(port))
            .await
            .unwrap_or_else(|e| {
                warn!(port, error = %e, "port owner lookup panicked");
                None
            })
    }

    async fn terminate(&self, pid: u32) -> bool {
        let inspector = Arc::clone(&self.inspector);
        tokio::task::spawn_blocking(move || inspector.terminate(pid))
            .await
            .unwrap_or(false)
    }
}
