// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP test client.
//
// Speaks the same non-protocol as the relay: connect, write the bytes,
// half-close. Used to check a running relay end to end.

use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Timeout for establishing the connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Write size per call, for progress logging.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection to {addr} timed out after {}s", CONNECT_TIMEOUT.as_secs())]
    Timeout { addr: String },

    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("send failed after {sent} bytes: {source}")]
    Send {
        sent: usize,
        #[source]
        source: std::io::Error,
    },
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, ClientError> {
    let addr = format!("{host}:{port}");
    tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| ClientError::Timeout { addr: addr.clone() })?
        .map_err(|source| ClientError::Connect { addr, source })
}

/// Send `data` as one job to the relay at `host:port`.
pub async fn send_raw(host: &str, port: u16, data: &[u8]) -> Result<(), ClientError> {
    let mut stream = connect(host, port).await?;
    info!(host, port, total = data.len(), "sending raw job");

    let mut sent = 0;
    for chunk in data.chunks(CHUNK_SIZE) {
        stream
            .write_all(chunk)
            .await
            .map_err(|source| ClientError::Send { sent, source })?;
        sent += chunk.len();
        debug!(sent, total = data.len(), "raw send progress");
    }

    stream
        .flush()
        .await
        .map_err(|source| ClientError::Send { sent, source })?;
    stream
        .shutdown()
        .await
        .map_err(|source| ClientError::Send { sent, source })?;

    info!(total = data.len(), "raw job sent");
    Ok(())
}

/// Connect and disconnect without sending anything.
pub async fn check_connection(host: &str, port: u16) -> Result<(), ClientError> {
    let mut stream = connect(host, port).await?;
    let _ = stream.shutdown().await;
    info!(host, port, "relay accepted the connection");
    Ok(())
}
