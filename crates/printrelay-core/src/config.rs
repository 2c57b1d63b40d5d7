// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Relay server configuration.
//
// The record is read once at `start()`; the server never writes it back.
// Persistence belongs to the front end (see `printrelay-app`).

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Traditional raw-printing port (HP JetDirect).
pub const DEFAULT_PORT: u16 = 9100;

/// Settings for one relay server instance.
///
/// Every field has a default so partially written files merge cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Installed printer every job is forwarded to.
    pub printer_name: String,
    /// TCP port to listen on (1-65535).
    pub port: u16,
    /// Start the relay as soon as the front end launches.
    pub auto_start: bool,
    /// Hide to the tray instead of closing (UI only).
    pub minimize_to_tray: bool,
    /// Name used by the OS auto-start integration.
    pub service_name: String,
    /// Description used by the OS auto-start integration.
    pub service_description: String,
    /// Interface to bind.
    pub bind_address: IpAddr,
    /// How long in-flight jobs may keep draining after `stop()`.
    pub grace_period_ms: u64,
    /// Abort a job when the client sends nothing for this long.
    pub idle_timeout_ms: Option<u64>,
    /// Cap on simultaneously handled connections; extra ones are closed.
    pub max_in_flight_jobs: usize,
    /// Largest accepted job; bigger payloads fail the job.
    pub max_job_bytes: u64,
    /// Terminate a stale copy of this server found holding the port.
    pub reclaim_stale_instances: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            printer_name: String::new(),
            port: DEFAULT_PORT,
            auto_start: false,
            minimize_to_tray: true,
            service_name: "printrelay".into(),
            service_description: "printrelay - network relay for raw print data".into(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            grace_period_ms: 5_000,
            idle_timeout_ms: None,
            max_in_flight_jobs: 64,
            max_job_bytes: 256 * 1024 * 1024,
            reclaim_stale_instances: true,
        }
    }
}

impl ServerConfig {
    /// Config for `printer_name` on `port`, everything else defaulted.
    pub fn new(printer_name: impl Into<String>, port: u16) -> Self {
        Self {
            printer_name: printer_name.into(),
            port,
            ..Self::default()
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// Check the fields the relay cannot run without.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.printer_name.trim().is_empty() {
            return Err("no printer configured".into());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".into());
        }
        if self.max_in_flight_jobs == 0 {
            return Err("max_in_flight_jobs must be at least 1".into());
        }
        if self.max_job_bytes == 0 {
            return Err("max_job_bytes must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_9100() {
        assert_eq!(ServerConfig::default().port, 9100);
    }

    #[test]
    fn empty_printer_is_rejected() {
        let err = ServerConfig::default().validate().unwrap_err();
        assert!(err.contains("printer"));
    }

    #[test]
    fn port_zero_is_rejected() {
        let cfg = ServerConfig::new("Office", 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_job_cap_is_rejected() {
        let cfg = ServerConfig {
            max_in_flight_jobs: 0,
            ..ServerConfig::new("Office", 9100)
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        assert!(ServerConfig::new("Office", 9100).validate().is_ok());
    }

    #[test]
    fn partial_json_merges_with_defaults() {
        let cfg: ServerConfig =
            serde_json::from_str(r#"{"printer_name": "Label", "port": 9200}"#).unwrap();
        assert_eq!(cfg.printer_name, "Label");
        assert_eq!(cfg.port, 9200);
        assert_eq!(cfg.grace_period(), Duration::from_secs(5));
        assert!(cfg.minimize_to_tray);
        assert_eq!(cfg.idle_timeout(), None);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg: ServerConfig = serde_json::from_str(
            r#"{"printer_name": "Label", "use_pdf_conversion": true, "manual": true}"#,
        )
        .unwrap();
        assert_eq!(cfg.printer_name, "Label");
    }
}
