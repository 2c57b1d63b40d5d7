// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sink and process doubles shared by the server tests.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use printrelay_core::error::SinkError;
use printrelay_core::types::PortConflict;
use printrelay_sink::PrintSink;

use crate::process::ProcessInspector;

/// Accepts everything and remembers it.
#[derive(Default)]
pub struct RecordingSink {
    jobs: Mutex<Vec<(String, Vec<u8>)>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// A sink whose deliveries take `delay` each.
    pub fn slow(delay: Duration) -> Self {
        Self {
            jobs: Mutex::default(),
            delay: Some(delay),
        }
    }

    /// `(printer, payload)` per delivery, in call order.
    pub fn jobs(&self) -> Vec<(String, Vec<u8>)> {
        self.jobs.lock().unwrap().clone()
    }
}

impl PrintSink for RecordingSink {
    fn kind(&self) -> &'static str {
        "recording"
    }

    fn deliver(&self, printer_name: &str, data: &[u8]) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.jobs
            .lock()
            .unwrap()
            .push((printer_name.to_string(), data.to_vec()));
        Ok(())
    }
}

/// Rejects the first `failures` deliveries, then accepts.
pub struct FailingSink {
    error: SinkError,
    remaining: Mutex<Option<usize>>,
    delivered: Mutex<Vec<Vec<u8>>>,
}

impl FailingSink {
    /// Always answers "printer not found".
    pub fn not_found() -> Self {
        Self {
            error: SinkError::NotFound("Office".into()),
            remaining: Mutex::new(None),
            delivered: Mutex::default(),
        }
    }

    pub fn failing_first(failures: usize, error: SinkError) -> Self {
        Self {
            error,
            remaining: Mutex::new(Some(failures)),
            delivered: Mutex::default(),
        }
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().unwrap().clone()
    }
}

impl PrintSink for FailingSink {
    fn kind(&self) -> &'static str {
        "failing"
    }

    fn deliver(&self, _printer_name: &str, data: &[u8]) -> Result<(), SinkError> {
        let mut remaining = self.remaining.lock().unwrap();
        match remaining.as_mut() {
            None => return Err(self.error.clone()),
            Some(0) => {}
            Some(n) => {
                *n -= 1;
                return Err(self.error.clone());
            }
        }
        self.delivered.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

/// Pretends to be the process behind a real loopback listener.
/// Terminating it drops the socket, unless it is stubborn.
pub struct FakeInspector {
    listener: Mutex<Option<TcpListener>>,
    stale: bool,
    stubborn: bool,
    terminated: Mutex<Vec<u32>>,
}

impl FakeInspector {
    pub const PID: u32 = 4242;

    /// A holder of a fresh loopback port, stale or unrelated.
    pub fn holding(stale: bool) -> (Arc<Self>, u16) {
        Self::build(stale, false)
    }

    /// A stale instance that survives termination.
    pub fn stubborn() -> (Arc<Self>, u16) {
        Self::build(true, true)
    }

    fn build(stale: bool, stubborn: bool) -> (Arc<Self>, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let fake = Arc::new(Self {
            listener: Mutex::new(Some(listener)),
            stale,
            stubborn,
            terminated: Mutex::new(Vec::new()),
        });
        (fake, port)
    }

    /// Pids passed to `terminate`, in call order.
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn still_holding(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }
}

impl ProcessInspector for FakeInspector {
    fn listener_on(&self, _port: u16) -> Option<PortConflict> {
        self.listener.lock().unwrap().as_ref().map(|_| PortConflict {
            pid: Self::PID,
            process_name: if self.stale { "printrelay" } else { "cupsd" }.into(),
            exe: None,
        })
    }

    fn is_stale_instance(&self, _conflict: &PortConflict) -> bool {
        self.stale
    }

    fn terminate(&self, pid: u32) -> bool {
        self.terminated.lock().unwrap().push(pid);
        if self.stubborn {
            return false;
        }
        self.listener.lock().unwrap().take();
        true
    }
}
