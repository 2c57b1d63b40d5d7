// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection Handler: one accepted socket from first byte to job outcome.
//
// A job is whatever the client sends before closing its write side. The
// bytes are never inspected. Once the read completes the payload goes to the
// print sink on the blocking pool and the finished job is published.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use printrelay_core::error::{ConnectionError, SinkError};
use printrelay_core::types::{EventKind, Job, JobOutcome};
use printrelay_sink::PrintSink;

use crate::events::EventBus;

/// Read buffer size per socket read.
const CHUNK_SIZE: usize = 8192;

/// Everything a handler needs, captured when the connection is dispatched.
#[derive(Clone)]
pub struct HandlerContext {
    pub sink: Arc<dyn PrintSink>,
    pub events: EventBus,
    pub printer: Arc<str>,
    pub idle_timeout: Option<Duration>,
    pub max_job_bytes: u64,
    /// Flips to `true` when the server gives up waiting for handlers.
    pub abandon: watch::Receiver<bool>,
}

/// Relay one connection and return the finished job.
///
/// Publishes exactly one `JobOutcome` event. Never fails: every problem
/// ends up in the job's outcome.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: HandlerContext) -> Job
where
    S: AsyncRead + Unpin + Send,
{
    let mut job = Job::accept(peer, ctx.printer.as_ref());
    debug!(job = %job.id, peer = %peer, "connection accepted");

    let mut abandon = ctx.abandon.clone();
    let relayed = tokio::select! {
        outcome = relay(stream, &mut job, &ctx) => Some(outcome),
        _ = abandoned(&mut abandon) => None,
    };
    let outcome = relayed.unwrap_or_else(|| {
        if job.digest.is_some() {
            warn!(
                job = %job.id,
                printer = %ctx.printer,
                "job abandoned during delivery; the spooler may still print it"
            );
        }
        JobOutcome::Failed(ConnectionError::Cancelled)
    });

    let job = job.complete(outcome);
    match &job.outcome {
        JobOutcome::Success => info!(
            job = %job.id,
            peer = %peer,
            printer = %job.printer,
            bytes = job.bytes,
            "job relayed"
        ),
        JobOutcome::Empty => debug!(job = %job.id, peer = %peer, "connection closed without data"),
        JobOutcome::Failed(e) => warn!(
            job = %job.id,
            peer = %peer,
            bytes = job.bytes,
            error = %e,
            "job failed"
        ),
        JobOutcome::InProgress => {}
    }

    ctx.events.publish(EventKind::JobOutcome(job.clone()));
    job
}

/// Resolves once the abandon flag is raised. Pending forever if the server
/// side is gone, since then nobody will ever raise it.
async fn abandoned(abandon: &mut watch::Receiver<bool>) {
    if abandon.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn relay<S>(stream: S, job: &mut Job, ctx: &HandlerContext) -> JobOutcome
where
    S: AsyncRead + Unpin + Send,
{
    let data = match read_job(stream, ctx.idle_timeout, ctx.max_job_bytes, &mut job.bytes).await {
        Ok(data) => data,
        Err(e) => return JobOutcome::Failed(e),
    };
    if data.is_empty() {
        return JobOutcome::Empty;
    }

    job.digest = Some(hex::encode(Sha256::digest(&data)));
    debug!(job = %job.id, bytes = data.len(), "payload received");

    let sink = Arc::clone(&ctx.sink);
    let printer = Arc::clone(&ctx.printer);
    let delivered = tokio::task::spawn_blocking(move || sink.deliver(&printer, &data)).await;
    match delivered {
        Ok(Ok(())) => JobOutcome::Success,
        Ok(Err(e)) => JobOutcome::Failed(e.into()),
        Err(e) => JobOutcome::Failed(ConnectionError::Sink(SinkError::DeliveryFailed(format!(
            "sink task failed: {e}"
        )))),
    }
}

/// Read until EOF. `received` tracks progress so a cancelled read still
/// reports how much arrived.
async fn read_job<S>(
    mut stream: S,
    idle_timeout: Option<Duration>,
    limit: u64,
    received: &mut u64,
) -> Result<Vec<u8>, ConnectionError>
where
    S: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = stream.read(&mut buf);
        let n = match idle_timeout {
            Some(idle) => tokio::time::timeout(idle, read).await.map_err(|_| {
                ConnectionError::Read(format!("no data for {} ms", idle.as_millis()))
            })?,
            None => read.await,
        }
        .map_err(|e| ConnectionError::Read(e.to_string()))?;

        if n == 0 {
            return Ok(data);
        }
        *received += n as u64;
        if *received > limit {
            return Err(ConnectionError::TooLarge { limit });
        }
        data.extend_from_slice(&buf[..n]);
    }
}
