// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw-port (JetDirect / 9100) print server -- makes this host act as a
// network printer that archives every job as a PDF.
//
// # Job framing
//
// There is no handshake, no framing and no acknowledgement.  Each accepted
// connection carries exactly one job: everything the client sends until it
// closes the connection.  The connection is closed as soon as the job is
// complete, before conversion starts, so the client never waits on the
// renderer.
//
// # Concurrency
//
// Every connection runs in its own task.  A semaphore caps how many are
// handled at once; while all permits are taken the accept loop stops
// calling `accept`, leaving further clients in the kernel backlog.
//
// # Shutdown
//
// `stop` closes the listener, gives in-flight jobs the configured drain
// period, then cancels the rest.  Cancellation unblocks stalled socket reads
// and kills running renderers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pdfsrv_core::config::ServerConfig;
use pdfsrv_core::error::{PdfsrvError, Result};
use pdfsrv_core::types::{ErrorClass, Job, JobId, JobOutcome, JobReport, ServerStatus};
use pdfsrv_document::{PdfConverter, sniff};

use crate::collector::{CollectLimits, collect_job};

/// Buffered job reports per subscriber before the oldest are dropped.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Pause after a failed `accept` so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Shared state passed to connection handlers
// ---------------------------------------------------------------------------

/// State shared across all connection-handling tasks.
struct SharedState {
    converter: Arc<PdfConverter>,
    limits: CollectLimits,
    active_connections: Arc<AtomicU32>,
    reports: broadcast::Sender<JobReport>,
    /// Cancels in-flight reads and renderers once the drain period is over.
    jobs_cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// RawServer
// ---------------------------------------------------------------------------

/// Raw-port print server.
///
/// Binds a TCP listener and turns every connection into a job that is
/// sniffed and, for PostScript or PCL, rendered to a PDF in the output
/// directory.
pub struct RawServer {
    config: ServerConfig,
    converter: Arc<PdfConverter>,
    status: ServerStatus,
    /// Actual bound address (differs from the config when port 0 is used).
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
    reports: broadcast::Sender<JobReport>,
}

impl RawServer {
    /// Create a server for `config`.  The server is created in `Stopped`
    /// state; call [`start`](Self::start) to begin accepting connections.
    pub fn new(config: ServerConfig) -> Self {
        let converter = PdfConverter::from_config(&config);
        Self::with_converter(config, converter)
    }

    /// Create a server that renders through `converter` instead of the
    /// engines named in `config`.
    pub fn with_converter(config: ServerConfig, converter: PdfConverter) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            config,
            converter: Arc::new(converter),
            status: ServerStatus::Stopped,
            local_addr: None,
            shutdown: CancellationToken::new(),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            reports,
        }
    }

    /// Port from the configuration.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Number of connections currently being collected or converted.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Receive a [`JobReport`] for every connection handled from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.reports.subscribe()
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`PdfsrvError::Bind`] if the address is in use or the socket
    /// cannot be created, and [`PdfsrvError::Config`] for invalid settings.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(port = self.config.port, "raw print server already running");
            return Ok(());
        }

        self.status = ServerStatus::Starting;

        let (listener, local_addr) = match self.bind() {
            Ok(bound) => bound,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(e);
            }
        };
        self.local_addr = Some(local_addr);

        info!(
            addr = %local_addr,
            output_dir = %self.converter.output_dir().display(),
            max_connections = self.config.max_connections,
            "listening for print jobs"
        );

        self.shutdown = CancellationToken::new();
        let shared = Arc::new(SharedState {
            converter: Arc::clone(&self.converter),
            limits: CollectLimits::from_config(&self.config),
            active_connections: Arc::clone(&self.active_connections),
            reports: self.reports.clone(),
            jobs_cancel: CancellationToken::new(),
        });
        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let shutdown = self.shutdown.clone();
        let drain_timeout = self.config.drain_timeout();

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, permits, shared, drain_timeout).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting, drain in-flight jobs, and wait for the accept loop.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.config.port, "stopping raw print server");
        self.shutdown.cancel();

        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|e| {
                self.status = ServerStatus::Error;
                PdfsrvError::Transport(format!("accept loop join: {e}"))
            })?;
        }

        self.status = ServerStatus::Stopped;
        info!(port = self.config.port, "raw print server stopped");
        Ok(())
    }

    /// Serve until `signal` resolves, then shut down gracefully.
    pub async fn run_until_shutdown<F>(&mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        info!("shutdown requested");
        self.stop().await
    }

    /// Validate the configuration, bind, and report the bound address.
    fn bind(&self) -> Result<(TcpListener, SocketAddr)> {
        self.config.validate()?;
        let addr = self.config.bind_addr()?;
        let bind_err = |e: std::io::Error| PdfsrvError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(self.config.backlog).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok((listener, local_addr))
    }

    /// The main accept loop.
    ///
    /// Waits for a free connection permit, then for a connection, and hands
    /// it to [`handle_connection`] in its own task.  Runs until `shutdown`
    /// fires, then drains.
    async fn accept_loop(
        listener: TcpListener,
        shutdown: CancellationToken,
        permits: Arc<Semaphore>,
        shared: Arc<SharedState>,
        drain_timeout: Duration,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "incoming connection");
                    let state = Arc::clone(&shared);
                    tasks.spawn(async move {
                        let _active = ActiveConnection::enter(&state.active_connections);
                        handle_connection(stream, peer, &state).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "connection task panicked");
                }
            }
        }

        drop(listener);
        debug!("listener closed");

        drain(&mut tasks, drain_timeout, &shared.jobs_cancel).await;
    }
}

/// Counts a connection as active for as long as it lives, including when
/// its handler panics.
struct ActiveConnection(Arc<AtomicU32>);

impl ActiveConnection {
    fn enter(counter: &Arc<AtomicU32>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Wait up to `timeout` for running jobs, then cancel and reap the rest.
async fn drain(tasks: &mut JoinSet<()>, timeout: Duration, jobs_cancel: &CancellationToken) {
    if tasks.is_empty() {
        return;
    }

    info!(in_flight = tasks.len(), "waiting for in-flight jobs");
    let drained = tokio::time::timeout(timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = tasks.len(),
            "drain period elapsed, cancelling in-flight jobs"
        );
        jobs_cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }
}

/// Handle a single incoming connection: collect, close, dispatch, report.
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, state: &SharedState) {
    let collected = collect_job(&mut stream, peer, &state.limits, &state.jobs_cancel).await;
    // The job is complete (or abandoned); the client gets nothing back.
    drop(stream);

    let report = match collected {
        Ok(job) => dispatch_job(&job, &state.converter, &state.jobs_cancel).await,
        Err(e) => {
            warn!(peer = %peer, error = %e, "abandoned print job");
            JobReport {
                job_id: JobId::new(),
                peer,
                received_at: Utc::now(),
                format: None,
                bytes: 0,
                digest: String::new(),
                outcome: JobOutcome::Abandoned {
                    error: e.to_string(),
                },
            }
        }
    };

    // No subscribers is the normal case for the CLI.
    let _ = state.reports.send(report);
}

/// Route a completed job: sniff it, then render PostScript and PCL and
/// discard everything else.
pub async fn dispatch_job(
    job: &Job,
    converter: &PdfConverter,
    cancel: &CancellationToken,
) -> JobReport {
    let format = sniff(job.bytes());
    info!(
        job_id = %job.id,
        peer = %job.peer,
        bytes = job.len(),
        format = %format,
        mime = format.mime_type(),
        "received print job, processing"
    );

    let outcome = if format.is_convertible() {
        match converter.convert(job, format, cancel).await {
            Ok(path) => JobOutcome::Converted { path },
            Err(e) => {
                match e.class() {
                    ErrorClass::Transport => {
                        warn!(job_id = %job.id, error = %e, "conversion interrupted")
                    }
                    _ => error!(job_id = %job.id, format = %format, error = %e, "conversion failed"),
                }
                JobOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    } else {
        info!(job_id = %job.id, bytes = job.len(), "Unknown format, job discarded");
        JobOutcome::Discarded
    };

    JobReport {
        job_id: job.id,
        peer: job.peer,
        received_at: job.received_at,
        format: Some(format),
        bytes: job.len() as u64,
        digest: job.digest(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfsrv_core::types::JobFormat;

    fn local_config(output_dir: &std::path::Path) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            output_dir: output_dir.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn default_port_is_9100() {
        let server = RawServer::new(ServerConfig::default());
        assert_eq!(server.port(), 9100);
    }

    #[test]
    fn initial_status_is_stopped() {
        let server = RawServer::new(ServerConfig::default());
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.active_connections(), 0);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = RawServer::new(local_config(dir.path()));

        server.start().await.expect("start");
        assert_eq!(server.status(), ServerStatus::Running);
        let addr = server.local_addr().expect("bound");
        assert_ne!(addr.port(), 0);

        server.stop().await.expect("stop");
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn port_in_use_is_a_bind_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = RawServer::new(ServerConfig {
            port,
            ..local_config(dir.path())
        });

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, PdfsrvError::Bind { .. }));
        assert_eq!(err.class(), ErrorClass::Startup);
        assert_eq!(server.status(), ServerStatus::Error);
    }

    #[tokio::test]
    async fn invalid_config_fails_start_with_error_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut server = RawServer::new(ServerConfig {
            idle_timeout_secs: Some(0),
            ..local_config(dir.path())
        });

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, PdfsrvError::Config(_)));
        assert_eq!(server.status(), ServerStatus::Error);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn panicking_handler_still_releases_its_connection() {
        let counter = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&counter);

        let handle = tokio::spawn(async move {
            let _active = ActiveConnection::enter(&inner);
            assert_eq!(inner.load(Ordering::Relaxed), 1);
            panic!("handler blew up");
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn received_job_is_logged_with_size_and_format() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::TempDir::new().unwrap();
        let converter = PdfConverter::new(dir.path(), "/nonexistent/gs", "/nonexistent/gpcl6");
        let job = Job::new("127.0.0.1:1".parse().unwrap(), b"\x1bE\x1b&l0O".to_vec());
        let report = dispatch_job(&job, &converter, &CancellationToken::new()).await;
        assert_eq!(report.received_at, job.received_at);

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = text
            .lines()
            .find(|l| l.contains("received print job"))
            .expect("received line logged");
        assert!(line.contains("bytes=7"), "{line}");
        assert!(line.contains("format=PCL"), "{line}");
        assert!(line.contains("application/vnd.hp-pcl"), "{line}");
    }

    #[tokio::test]
    async fn unknown_job_is_discarded_without_rendering() {
        let dir = tempfile::TempDir::new().unwrap();
        // Engines that cannot exist: any rendering attempt would fail.
        let converter = PdfConverter::new(dir.path(), "/nonexistent/gs", "/nonexistent/gpcl6");
        let job = Job::new("127.0.0.1:1".parse().unwrap(), b"garbage".to_vec());

        let report = dispatch_job(&job, &converter, &CancellationToken::new()).await;

        assert_eq!(report.format, Some(JobFormat::Unknown));
        assert_eq!(report.outcome, JobOutcome::Discarded);
        assert_eq!(report.bytes, 7);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_job_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let converter = PdfConverter::new(dir.path(), "/nonexistent/gs", "/nonexistent/gpcl6");
        let job = Job::new("127.0.0.1:1".parse().unwrap(), Vec::new());

        let report = dispatch_job(&job, &converter, &CancellationToken::new()).await;
        assert_eq!(report.format, Some(JobFormat::Unknown));
        assert_eq!(report.outcome, JobOutcome::Discarded);
    }

    #[tokio::test]
    async fn missing_engine_is_a_failed_job() {
        let dir = tempfile::TempDir::new().unwrap();
        let converter = PdfConverter::new(dir.path(), "/nonexistent/gs", "/nonexistent/gpcl6");
        let job = Job::new("127.0.0.1:1".parse().unwrap(), b"\x1bE".to_vec());

        let report = dispatch_job(&job, &converter, &CancellationToken::new()).await;
        assert_eq!(report.format, Some(JobFormat::Pcl));
        assert!(matches!(report.outcome, JobOutcome::Failed { .. }));
    }
}
