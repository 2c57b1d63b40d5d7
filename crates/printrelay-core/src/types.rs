// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the relay: server state, jobs, port conflicts and
// the event records published to front ends.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConnectionError;

/// Unique identifier for a relayed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the relay server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
    /// Start failed; the server falls back to `Stopped` right after.
    Failed,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Where a job ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum JobOutcome {
    InProgress,
    /// The sink accepted the payload.
    Success,
    /// The client closed without sending anything; nothing was printed.
    Empty,
    Failed(ConnectionError),
}

impl JobOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One accepted connection and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub peer: SocketAddr,
    /// Printer captured when the connection was dispatched.
    pub printer: String,
    /// Bytes received from the client.
    pub bytes: u64,
    /// SHA-256 of the payload, hex encoded. Set once the read completes.
    pub digest: Option<String>,
    pub outcome: JobOutcome,
    pub accepted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh in-progress job for a connection from `peer`.
    pub fn accept(peer: SocketAddr, printer: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            peer,
            printer: printer.into(),
            bytes: 0,
            digest: None,
            outcome: JobOutcome::InProgress,
            accepted_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Close the job with its terminal outcome.
    ///
    /// Consumes the job so a finished record cannot be touched again.
    pub fn complete(mut self, outcome: JobOutcome) -> Self {
        debug_assert!(outcome.is_terminal(), "jobs complete with a terminal outcome");
        self.outcome = outcome;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

/// The process found listening on a port we want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConflict {
    pub pid: u32,
    pub process_name: String,
    pub exe: Option<PathBuf>,
}

impl std::fmt::Display for PortConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (pid {})", self.process_name, self.pid)
    }
}

/// A server state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: ServerState,
    pub to: ServerState,
    /// Set when the transition was caused by an error.
    pub reason: Option<String>,
}

/// Payload of a [`RelayEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    StateChange(StateChange),
    JobOutcome(Job),
}

/// One entry of the live event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RelayEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}
