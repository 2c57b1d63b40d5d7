// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay: print sinks.
//
// `PrintSink` is the seam between the relay server and the machine's
// printing system. Each target platform gets its own implementation and
// `platform_sink()` picks the one compiled for this build. The directory
// sink works everywhere and is used for headless setups and debugging.

use std::sync::Arc;

pub mod directory;
pub mod traits;

#[cfg(unix)]
pub mod cups;

#[cfg(windows)]
pub mod windows;

#[cfg(not(any(unix, windows)))]
pub mod stub;

pub use directory::DirectorySink;
pub use traits::{PrintSink, PrinterCatalog};

/// The spooler sink for the operating system this binary was built for.
pub fn platform_sink() -> Arc<dyn PrintSink> {
    #[cfg(unix)]
    {
        Arc::new(cups::CupsSink::new())
    }
    #[cfg(windows)]
    {
        Arc::new(windows::SpoolerSink::new())
    }
    #[cfg(not(any(unix, windows)))]
    {
        Arc::new(stub::StubSink)
    }
}

/// The printer listing for the operating system this binary was built for.
pub fn platform_catalog() -> Box<dyn PrinterCatalog> {
    #[cfg(unix)]
    {
        Box::new(cups::CupsSink::new())
    }
    #[cfg(windows)]
    {
        Box::new(windows::SpoolerSink::new())
    }
    #[cfg(not(any(unix, windows)))]
    {
        Box::new(stub::StubSink)
    }
}
