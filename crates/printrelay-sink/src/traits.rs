// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for local print delivery.

use printrelay_core::error::SinkError;

/// Deliver a finished job to a named local printer.
///
/// Calls are synchronous and may block on spooler I/O; async callers run
/// them on the blocking pool. Implementations never retry.
pub trait PrintSink: Send + Sync {
    /// Short label for logs ("cups", "win32-spooler", "directory").
    fn kind(&self) -> &'static str;

    /// Hand `data` to `printer_name` unchanged.
    ///
    /// An unknown printer is `SinkError::NotFound`; a spooler that refuses
    /// or breaks off the job is `SinkError::DeliveryFailed`.
    fn deliver(&self, printer_name: &str, data: &[u8]) -> Result<(), SinkError>;
}

/// Enumerate the printers a sink can deliver to.
pub trait PrinterCatalog: Send + Sync {
    fn list_printers(&self) -> Result<Vec<String>, SinkError>;
}
