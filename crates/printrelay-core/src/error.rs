// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for printrelay, one enum per concern.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PortConflict;

/// Why `start()` refused or failed.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("relay server is already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("port {port} is already in use{}", holder_suffix(.holder))]
    PortBusy {
        port: u16,
        holder: Option<PortConflict>,
    },

    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Why `stop()` refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StopError {
    #[error("relay server is not running")]
    NotRunning,
}

/// Failure reported by a print sink.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SinkError {
    #[error("printer not found: {0}")]
    NotFound(String),

    #[error("delivery to spooler failed: {0}")]
    DeliveryFailed(String),
}

/// Why a single job did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConnectionError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("job exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("cancelled by server shutdown")]
    Cancelled,

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Port Guard outcome when the port cannot be made available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port {port} is already in use{}", holder_suffix(.holder))]
    Busy {
        port: u16,
        holder: Option<PortConflict>,
    },
}

impl From<PortError> for StartError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Busy { port, holder } => StartError::PortBusy { port, holder },
        }
    }
}

fn holder_suffix(holder: &Option<PortConflict>) -> String {
    match holder {
        Some(conflict) => format!(" by {conflict}"),
        None => String::new(),
    }
}
