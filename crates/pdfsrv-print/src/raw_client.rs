// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP print client (JetDirect, port 9100).
//
// The client side of the job framing: open a TCP socket, dump the document,
// and half-close.  The half-close is what tells the printer (or pdfsrv) that
// the job is complete.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use pdfsrv_core::error::{PdfsrvError, Result};

/// Timeout for establishing the connection.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Bytes written per `write_all` call.
const SEND_CHUNK_BYTES: usize = 8192;

/// Send `document_bytes` as one raw-port job and close the connection.
pub async fn send_raw(addr: SocketAddr, document_bytes: &[u8]) -> Result<()> {
    info!(addr = %addr, total = document_bytes.len(), "connecting via raw TCP");

    let mut stream = tokio::time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        TcpStream::connect(addr),
    )
    .await
    .map_err(|_| {
        PdfsrvError::Transport(format!(
            "raw TCP connection to {addr} timed out after {CONNECT_TIMEOUT_SECS}s"
        ))
    })?
    .map_err(|e| PdfsrvError::Transport(format!("raw TCP connect to {addr}: {e}")))?;

    let mut sent = 0usize;
    for chunk in document_bytes.chunks(SEND_CHUNK_BYTES) {
        stream.write_all(chunk).await.map_err(|e| {
            PdfsrvError::Transport(format!("raw TCP send failed at byte {sent}: {e}"))
        })?;
        sent += chunk.len();
        debug!(sent, total = document_bytes.len(), "raw TCP progress");
    }

    stream
        .flush()
        .await
        .map_err(|e| PdfsrvError::Transport(format!("raw TCP flush: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| PdfsrvError::Transport(format!("raw TCP shutdown: {e}")))?;

    info!(total = document_bytes.len(), "raw TCP print job sent");
    Ok(())
}
