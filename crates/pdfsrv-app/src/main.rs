// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfsrv: virtual network printer.
//
// Entry point. Initialises logging, resolves configuration, makes sure the
// output directory exists, and runs the raw-port server in the foreground
// until interrupted.

mod cli;

use anyhow::{Context, Result};
use tracing::{error, info};

use pdfsrv_print::RawServer;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse_args()
        .into_config()
        .context("invalid configuration")?;

    config.prepare_output_dir().with_context(|| {
        format!(
            "cannot prepare output directory {}",
            config.output_dir.display()
        )
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        output_dir = %config.output_dir.display(),
        "pdfsrv starting"
    );

    let mut server = RawServer::new(config);
    server
        .run_until_shutdown(shutdown_signal())
        .await
        .context("print server failed")?;

    info!("server socket closed, bye");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received"),
        _ = terminate => info!("terminate signal received"),
    }
}
