// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.
//
// Printer set-up guides for this tool have long used `-host` and `-port`
// with a single dash, so those two spellings are rewritten to their
// double-dash forms before clap sees them.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use pdfsrv_core::config::ServerConfig;
use pdfsrv_core::error::Result;

/// Flags accepted with a single leading dash.
const LEGACY_FLAGS: &[&str] = &["host", "port"];

/// Virtual network printer: receives PostScript / PCL jobs on a raw TCP
/// port (JetDirect, 9100) and saves each one as a PDF.
#[derive(Debug, Parser)]
#[command(name = "pdfsrv", version, about)]
pub struct Cli {
    /// IP address to listen on [default: 0.0.0.0]
    #[arg(long, env = "PDFSRV_HOST", value_name = "IP")]
    pub host: Option<String>,

    /// TCP port to listen on [default: 9100]
    #[arg(long, env = "PDFSRV_PORT")]
    pub port: Option<u16>,

    /// Directory receiving the generated PDFs
    #[arg(long, env = "PDFSRV_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long, env = "PDFSRV_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Connections handled at the same time [default: 16]
    #[arg(long, env = "PDFSRV_MAX_CONNECTIONS", value_name = "N")]
    pub max_connections: Option<usize>,

    /// Drop a client that sends nothing for this many seconds
    #[arg(long = "idle-timeout", env = "PDFSRV_IDLE_TIMEOUT", value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Drop jobs larger than this many bytes
    #[arg(long, env = "PDFSRV_MAX_JOB_BYTES", value_name = "BYTES")]
    pub max_job_bytes: Option<u64>,

    /// Ghostscript executable used for PostScript jobs [default: gs]
    #[arg(long = "gs", env = "PDFSRV_GS", value_name = "PATH")]
    pub gs: Option<String>,

    /// GhostPCL executable used for PCL jobs [default: gpcl6]
    #[arg(long = "gpcl6", env = "PDFSRV_GPCL6", value_name = "PATH")]
    pub gpcl6: Option<String>,
}

impl Cli {
    /// Parse the process arguments, accepting the single-dash spellings.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Build the effective configuration: defaults, then the config file,
    /// then flags and environment variables.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(n) = self.max_connections {
            config.max_connections = n;
        }
        if self.idle_timeout.is_some() {
            config.idle_timeout_secs = self.idle_timeout;
        }
        if self.max_job_bytes.is_some() {
            config.max_job_bytes = self.max_job_bytes;
        }
        if let Some(gs) = self.gs {
            config.postscript_engine = gs;
        }
        if let Some(gpcl6) = self.gpcl6 {
            config.pcl_engine = gpcl6;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Rewrite `-host` / `-port` (and `-host=x`) to their `--` forms.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split('=').next().unwrap_or(rest);
            if LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("pdfsrv")
            .chain(args.iter().copied())
            .map(OsString::from);
        Cli::try_parse_from(normalize_args(argv)).expect("parse")
    }

    #[test]
    fn single_dash_host_and_port_are_accepted() {
        let cli = parse(&["-host", "127.0.0.1", "-port", "9101"]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9101));

        let cli = parse(&["-host=10.0.0.2", "--port=9102"]);
        assert_eq!(cli.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(cli.port, Some(9102));
    }

    #[test]
    fn normalize_leaves_other_arguments_alone() {
        let args: Vec<OsString> = ["pdfsrv", "--gs", "-x", "-hostile", "-"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert_eq!(normalize_args(args.clone()), args);
    }

    #[test]
    fn no_flags_gives_defaults() {
        let config = parse(&[]).into_config().expect("config");
        let defaults = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert_eq!(config.output_dir, defaults.output_dir);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("pdfsrv.json");
        std::fs::write(&file, r#"{ "port": 9200, "max_connections": 4, "pcl_engine": "pcl6" }"#)
            .unwrap();

        let config = parse(&[
            "--config",
            file.to_str().unwrap(),
            "-port",
            "9300",
            "--idle-timeout",
            "15",
            "--output-dir",
            "/srv/pdfs",
        ])
        .into_config()
        .expect("config");

        assert_eq!(config.port, 9300);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.pcl_engine, "pcl6");
        assert_eq!(config.idle_timeout_secs, Some(15));
        assert_eq!(config.output_dir, PathBuf::from("/srv/pdfs"));
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(parse(&["-host", "not-an-ip"]).into_config().is_err());
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let err = parse(&["--idle-timeout", "0"]).into_config().unwrap_err();
        assert!(err.to_string().contains("idle_timeout_secs"));
    }

    #[test]
    fn non_numeric_port_fails_to_parse() {
        let argv = ["pdfsrv", "-port", "ninety"].map(OsString::from);
        assert!(Cli::try_parse_from(normalize_args(argv)).is_err());
    }
}
