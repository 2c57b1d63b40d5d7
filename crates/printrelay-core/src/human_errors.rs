// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Front ends (console, tray, settings window) show these instead of the raw
// error text. Each message comes with a suggestion the operator can act on.

use crate::error::{ConnectionError, SinkError, StartError, StopError};

/// How the operator should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Likely to go away on its own; re-sending the job may work.
    Transient,
    /// The operator has to change something (config, printer, other app).
    ActionRequired,
    /// Nothing to fix; the request itself was wrong.
    Permanent,
}

/// A plain-language error with a suggested fix.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub severity: Severity,
}

pub fn describe_start_error(err: &StartError) -> HumanError {
    match err {
        StartError::AlreadyRunning => HumanError {
            message: "The relay is already running.".into(),
            suggestion: "Stop it first if you want to change the port or printer.".into(),
            severity: Severity::Permanent,
        },
        StartError::InvalidConfig(detail) => HumanError {
            message: "The relay settings are incomplete.".into(),
            suggestion: format!("Fix the configuration and start again ({detail})."),
            severity: Severity::ActionRequired,
        },
        StartError::PortBusy { port, holder } => HumanError {
            message: format!("Port {port} is used by another program."),
            suggestion: match holder {
                Some(conflict) => format!(
                    "Close {} or pick a different port in the settings.",
                    conflict
                ),
                None => "Close the program using it or pick a different port in the settings."
                    .into(),
            },
            severity: Severity::ActionRequired,
        },
        StartError::Bind { addr, source } => match source.kind() {
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: format!("Not allowed to listen on {addr}."),
                suggestion: "Ports below 1024 need elevated rights; choose a higher port or run as administrator.".into(),
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::AddrNotAvailable => HumanError {
                message: format!("The address {} does not belong to this machine.", addr.ip()),
                suggestion: "Use 0.0.0.0 to listen on every network interface.".into(),
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: format!("Could not open {addr} for listening."),
                suggestion: format!("Try again in a moment ({source})."),
                severity: Severity::Transient,
            },
        },
    }
}

pub fn describe_stop_error(err: &StopError) -> HumanError {
    match err {
        StopError::NotRunning => HumanError {
            message: "The relay is not running.".into(),
            suggestion: "Nothing to stop.".into(),
            severity: Severity::Permanent,
        },
    }
}

pub fn describe_sink_error(err: &SinkError) -> HumanError {
    match err {
        SinkError::NotFound(name) => HumanError {
            message: format!("The printer \"{name}\" is not installed."),
            suggestion: "Pick an installed printer in the settings (`printrelay printers` lists them).".into(),
            severity: Severity::ActionRequired,
        },
        SinkError::DeliveryFailed(detail) => HumanError {
            message: "The print spooler did not accept the job.".into(),
            suggestion: format!(
                "Check the printer is online and the printing service is running, then send the job again ({detail})."
            ),
            severity: Severity::Transient,
        },
    }
}

pub fn describe_connection_error(err: &ConnectionError) -> HumanError {
    match err {
        ConnectionError::Read(detail) => HumanError {
            message: "The sending computer dropped the connection.".into(),
            suggestion: format!("Send the job again ({detail})."),
            severity: Severity::Transient,
        },
        ConnectionError::TooLarge { limit } => HumanError {
            message: "The job was too large.".into(),
            suggestion: format!("Jobs are limited to {limit} bytes; raise max_job_bytes if this is expected."),
            severity: Severity::ActionRequired,
        },
        ConnectionError::Cancelled => HumanError {
            message: "The job was cut off because the relay stopped.".into(),
            suggestion: "Send the job again once the relay is running.".into(),
            severity: Severity::Transient,
        },
        ConnectionError::Sink(sink) => describe_sink_error(sink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortConflict;

    #[test]
    fn port_busy_mentions_holder() {
        let human = describe_start_error(&StartError::PortBusy {
            port: 9100,
            holder: Some(PortConflict {
                pid: 12,
                process_name: "spoolsv".into(),
                exe: None,
            }),
        });
        assert!(human.message.contains("9100"));
        assert!(human.suggestion.contains("spoolsv"));
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn permission_denied_bind_asks_for_action() {
        let human = describe_start_error(&StartError::Bind {
            addr: "0.0.0.0:515".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(human.severity, Severity::ActionRequired);
    }

    #[test]
    fn sink_error_inside_connection_error_is_unwrapped() {
        let human =
            describe_connection_error(&ConnectionError::Sink(SinkError::NotFound("Lbl".into())));
        assert!(human.message.contains("Lbl"));
    }

    #[test]
    fn cancelled_is_transient() {
        assert_eq!(
            describe_connection_error(&ConnectionError::Cancelled).severity,
            Severity::Transient
        );
    }
}
