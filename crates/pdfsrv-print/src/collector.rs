// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job collection: drain one raw-port connection into a single buffer.
//
// The raw protocol has no framing at all.  A job is every byte the client
// sends before it closes its side of the connection, so collection ends on
// the first zero-length read.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use pdfsrv_core::config::ServerConfig;
use pdfsrv_core::error::{PdfsrvError, Result};
use pdfsrv_core::types::Job;

/// Size of each socket read.
pub const READ_CHUNK_BYTES: usize = 1024;

/// Optional bounds on a single collection.  Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectLimits {
    /// Give up when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
    /// Give up when the job grows past this many bytes.
    pub max_job_bytes: Option<u64>,
}

impl CollectLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_job_bytes: config.max_job_bytes,
        }
    }
}

/// Read `reader` to end-of-stream and return everything as one [`Job`].
///
/// A peer that closes immediately yields an empty job.  Read failures,
/// limit violations and cancellation abandon the partial job.
pub async fn collect_job<R>(
    reader: &mut R,
    peer: SocketAddr,
    limits: &CollectLimits,
    cancel: &CancellationToken,
) -> Result<Job>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    loop {
        let next = read_chunk(reader, &mut chunk, limits.idle_timeout);
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(peer = %peer, received = data.len(), "collection cancelled");
                return Err(PdfsrvError::Cancelled);
            }
            read = next => read?,
        };

        if n == 0 {
            break;
        }

        if let Some(limit) = limits.max_job_bytes {
            if (data.len() + n) as u64 > limit {
                return Err(PdfsrvError::JobTooLarge { limit });
            }
        }

        data.extend_from_slice(&chunk[..n]);
        trace!(peer = %peer, received = data.len(), "job chunk");
    }

    debug!(peer = %peer, bytes = data.len(), "peer closed connection, job complete");
    Ok(Job::new(peer, data))
}

async fn read_chunk<R>(
    reader: &mut R,
    chunk: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let read = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(chunk))
            .await
            .map_err(|_| PdfsrvError::IdleTimeout {
                secs: limit.as_secs(),
            })?,
        None => reader.read(chunk).await,
    };
    read.map_err(|e| PdfsrvError::Transport(e.to_string()))
}
