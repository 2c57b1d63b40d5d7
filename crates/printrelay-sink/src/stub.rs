// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub sink for targets without a supported spooler.

use printrelay_core::error::SinkError;

use crate::traits::{PrintSink, PrinterCatalog};

/// Sink that refuses every job.
pub struct StubSink;

impl PrintSink for StubSink {
    fn kind(&self) -> &'static str {
        "stub"
    }

    fn deliver(&self, _printer_name: &str, _data: &[u8]) -> Result<(), SinkError> {
        tracing::warn!("PrintSink::deliver called on stub sink");
        Err(SinkError::DeliveryFailed("no spooler on this platform".into()))
    }
}

impl PrinterCatalog for StubSink {
    fn list_printers(&self) -> Result<Vec<String>, SinkError> {
        Err(SinkError::DeliveryFailed("no spooler on this platform".into()))
    }
}
