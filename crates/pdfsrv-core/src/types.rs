// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the pdfsrv virtual printer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a received print job.
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

/// Page description language of a job, decided from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobFormat {
    PostScript,
    /// PCL (Printer Command Language).
    Pcl,
    /// Anything else, including an empty job.
    Unknown,
}

impl JobFormat {
    /// MIME type string, as printers advertise it.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PostScript => "application/postscript",
            Self::Pcl => "application/vnd.hp-pcl",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Whether a rendering engine exists for this format.
    pub fn is_convertible(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for JobFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PostScript => "PostScript",
            Self::Pcl => "PCL",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One complete client transmission: everything sent on a single
/// connection up to peer close.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub peer: SocketAddr,
    pub received_at: DateTime<Utc>,
    data: Vec<u8>,
}

impl Job {
    pub fn new(peer: SocketAddr, data: Vec<u8>) -> Self {
        Self {
            id: JobId::new(),
            peer,
            received_at: Utc::now(),
            data,
        }
    }

    /// The raw job bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SHA-256 of the job bytes, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// Failure families, used to pick log levels and exit behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Socket accept/read failure. The connection is abandoned, serving continues.
    Transport,
    /// The renderer could not produce a PDF for this job.
    Conversion,
    /// Fatal before any connection is accepted.
    Startup,
}

/// What happened to a job once its connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    /// A PDF was written to `path`.
    Converted { path: PathBuf },
    /// Unknown format; nothing was written.
    Discarded,
    /// The renderer failed.
    Failed { error: String },
    /// The connection failed before the job was complete.
    Abandoned { error: String },
}

impl JobOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

/// Summary published for every accepted connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub peer: SocketAddr,
    /// When the job finished arriving, or when the connection was given up.
    pub received_at: DateTime<Utc>,
    /// `None` when the job never finished arriving.
    pub format: Option<JobFormat>,
    pub bytes: u64,
    /// SHA-256 of the job bytes; empty when abandoned.
    pub digest: String,
    pub outcome: JobOutcome,
}

/// Status of the raw-port print server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}
