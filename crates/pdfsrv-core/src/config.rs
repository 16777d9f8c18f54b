// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server configuration.
//
// A single `ServerConfig` value is built at startup (defaults, then an
// optional JSON file, then command-line flags) and handed to the server and
// converter by value.  Nothing in the workspace reads configuration from
// global state.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PdfsrvError, Result};

/// Conventional raw printer port (HP JetDirect).
pub const DEFAULT_PORT: u16 = 9100;

/// Smallest listen backlog we accept.
pub const MIN_BACKLOG: u32 = 50;

/// Runtime settings for the virtual printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to listen on (default all interfaces).
    pub host: String,
    /// TCP port to listen on (default 9100).
    pub port: u16,
    /// Directory receiving the generated PDFs.
    pub output_dir: PathBuf,
    /// Listen backlog for pending connections.
    pub backlog: u32,
    /// Connections handled concurrently; further clients wait in the backlog.
    pub max_connections: usize,
    /// Abandon a connection that sends nothing for this long.
    pub idle_timeout_secs: Option<u64>,
    /// Abandon a job larger than this.
    pub max_job_bytes: Option<u64>,
    /// Grace period for in-flight jobs after shutdown is requested.
    pub drain_timeout_secs: u64,
    /// Executable used for PostScript jobs.
    pub postscript_engine: String,
    /// Executable used for PCL jobs.
    pub pcl_engine: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            output_dir: default_output_dir(),
            backlog: MIN_BACKLOG,
            max_connections: 16,
            idle_timeout_secs: None,
            max_job_bytes: None,
            drain_timeout_secs: 5,
            postscript_engine: "gs".into(),
            pcl_engine: "gpcl6".into(),
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a JSON file.  Missing keys take their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check the settings that would otherwise fail late.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        if self.max_connections == 0 {
            return Err(PdfsrvError::Config(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.backlog < MIN_BACKLOG {
            return Err(PdfsrvError::Config(format!(
                "backlog must be at least {MIN_BACKLOG}, got {}",
                self.backlog
            )));
        }
        // Zero would drop every job; leave the option unset to disable it.
        if self.idle_timeout_secs == Some(0) {
            return Err(PdfsrvError::Config(
                "idle_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_job_bytes == Some(0) {
            return Err(PdfsrvError::Config(
                "max_job_bytes must be at least 1".into(),
            ));
        }
        if self.postscript_engine.trim().is_empty() || self.pcl_engine.trim().is_empty() {
            return Err(PdfsrvError::Config(
                "rendering engine names must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The socket address the listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            PdfsrvError::Config(format!("host `{}` is not an IP address: {e}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Create the output directory if it does not exist yet.
    pub fn prepare_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| PdfsrvError::OutputDir {
            path: self.output_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !self.output_dir.is_dir() {
            return Err(PdfsrvError::OutputDir {
                path: self.output_dir.display().to_string(),
                reason: "not a directory".into(),
            });
        }
        Ok(())
    }
}

/// Default location for generated PDFs.
///
/// `$XDG_DATA_HOME/pdfsrv/jobs`, then `$HOME/.local/share/pdfsrv/jobs`,
/// then `/tmp/pdfsrv/jobs`.
pub fn default_output_dir() -> PathBuf {
    data_home().join("pdfsrv").join("jobs")
}

fn data_home() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    PathBuf::from("/tmp")
}
