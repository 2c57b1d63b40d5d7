// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printrelay server: TCP listener, per-connection job handling, port
// conflict recovery and the live event feed. Front ends drive it through
// `RelayServer` and watch it through `EventStream`.

pub mod client;
pub mod connection;
pub mod events;
pub mod net;
pub mod port_guard;
pub mod process;
pub mod server;

#[cfg(test)]
mod testing;

pub use client::{ClientError, check_connection, send_raw};
pub use events::{EventBus, EventStream};
pub use net::local_ipv4;
pub use port_guard::PortGuard;
pub use process::{ProcessInspector, SystemInspector};
pub use server::RelayServer;
