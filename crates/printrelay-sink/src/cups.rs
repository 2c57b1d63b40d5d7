// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS sink for Linux, macOS and the BSDs.
//
// Jobs are piped to `lp -o raw` so CUPS hands the bytes to the backend
// without running any filter. Printer existence and listing go through
// `lpstat`. Both tools ship with every CUPS client install.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use printrelay_core::error::SinkError;

use crate::traits::{PrintSink, PrinterCatalog};

/// Job title shown in the CUPS queue.
const JOB_TITLE: &str = "printrelay job";

/// A spooler tool plus the leading arguments it is always run with.
#[derive(Debug, Clone)]
pub struct SpoolCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl SpoolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    fn label(&self) -> String {
        self.program.display().to_string()
    }
}

/// Delivers raw jobs through the CUPS command-line client.
#[derive(Debug, Clone)]
pub struct CupsSink {
    lp: SpoolCommand,
    lpstat: SpoolCommand,
}

impl Default for CupsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CupsSink {
    /// Use `lp` and `lpstat` from `PATH`.
    pub fn new() -> Self {
        Self::with_commands(SpoolCommand::new("lp"), SpoolCommand::new("lpstat"))
    }

    pub fn with_commands(lp: SpoolCommand, lpstat: SpoolCommand) -> Self {
        Self { lp, lpstat }
    }

    /// `lpstat -p` also fails when the scheduler is down; that is a spooler
    /// failure, not a missing printer.
    fn printer_exists(&self, printer_name: &str) -> Result<bool, SinkError> {
        let output = self
            .lpstat
            .command()
            .arg("-p")
            .arg(printer_name)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.lpstat, e))?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if scheduler_unreachable(&stderr) {
            warn!(printer = printer_name, detail = %stderr, "CUPS scheduler is not reachable");
            return Err(SinkError::DeliveryFailed(stderr));
        }
        Ok(false)
    }
}

impl PrintSink for CupsSink {
    fn kind(&self) -> &'static str {
        "cups"
    }

    fn deliver(&self, printer_name: &str, data: &[u8]) -> Result<(), SinkError> {
        if !self.printer_exists(printer_name)? {
            warn!(printer = printer_name, "printer not known to CUPS");
            return Err(SinkError::NotFound(printer_name.to_string()));
        }

        let mut child = self
            .lp
            .command()
            .args(["-d", printer_name, "-o", "raw", "-t", JOB_TITLE])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.lp, e))?;

        // The pipe must be closed before waiting, or lp never sees EOF.
        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(data).and_then(|()| stdin.flush()),
            None => Err(std::io::Error::other("lp stdin was not captured")),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| SinkError::DeliveryFailed(format!("waiting for lp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("lp exited with {}", output.status)
            } else {
                stderr
            };
            return Err(SinkError::DeliveryFailed(detail));
        }

        if let Err(e) = write_result {
            return Err(SinkError::DeliveryFailed(format!("writing job to lp: {e}")));
        }

        let request = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(printer = printer_name, request = %request, "lp accepted job");
        info!(printer = printer_name, bytes = data.len(), "job spooled via CUPS");
        Ok(())
    }
}

impl PrinterCatalog for CupsSink {
    fn list_printers(&self) -> Result<Vec<String>, SinkError> {
        let output = self
            .lpstat
            .command()
            .arg("-e")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.lpstat, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SinkError::DeliveryFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Messages lpstat prints when it cannot talk to cupsd.
const SCHEDULER_DOWN: [&str; 4] = [
    "unable to connect",
    "scheduler is not running",
    "connection refused",
    "no such file or directory",
];

fn scheduler_unreachable(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    SCHEDULER_DOWN.iter().any(|marker| stderr.contains(marker))
}

fn spawn_error(tool: &SpoolCommand, err: std::io::Error) -> SinkError {
    if err.kind() == std::io::ErrorKind::NotFound {
        SinkError::DeliveryFailed(format!(
            "{} not found; install the CUPS client tools",
            tool.label()
        ))
    } else {
        SinkError::DeliveryFailed(format!("{}: {err}", tool.label()))
    }
}
