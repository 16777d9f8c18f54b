// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PostScript / PCL to PDF conversion through external rendering engines.
//
// The job bytes are spooled to a scoped temporary file, an output path is
// reserved in the output directory, and the engine for the job's format is
// run as `<engine> -sDEVICE=pdfwrite -o <output> <input>`.  Ghostscript
// (`gs`) handles PostScript and GhostPCL (`gpcl6`) handles PCL.  Both
// engines are judged the same way: exit status zero and a non-empty output
// file, or the job has failed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use chrono::Local;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pdfsrv_core::config::ServerConfig;
use pdfsrv_core::error::{PdfsrvError, Result};
use pdfsrv_core::types::{Job, JobFormat};

use crate::naming::reserve_output_path;

/// Ghostscript device producing PDF output.
const PDF_DEVICE_ARG: &str = "-sDEVICE=pdfwrite";

/// Longest stderr excerpt kept in an error.
const MAX_STDERR_CHARS: usize = 2048;

/// Runs the rendering engines and owns the output directory.
#[derive(Debug, Clone)]
pub struct PdfConverter {
    output_dir: PathBuf,
    postscript_engine: String,
    pcl_engine: String,
}

impl PdfConverter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        postscript_engine: impl Into<String>,
        pcl_engine: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            postscript_engine: postscript_engine.into(),
            pcl_engine: pcl_engine.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.output_dir.clone(),
            config.postscript_engine.clone(),
            config.pcl_engine.clone(),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The executable that renders `format`, if any.
    pub fn engine_for(&self, format: JobFormat) -> Option<&str> {
        match format {
            JobFormat::PostScript => Some(self.postscript_engine.as_str()),
            JobFormat::Pcl => Some(self.pcl_engine.as_str()),
            JobFormat::Unknown => None,
        }
    }

    /// Render `job` to a new PDF in the output directory.
    ///
    /// Returns the path of the written PDF.  On every error path the
    /// temporary input file and the reserved output path are removed.  If
    /// `cancel` fires while the engine runs, the engine is killed and
    /// [`PdfsrvError::Cancelled`] is returned.
    pub async fn convert(
        &self,
        job: &Job,
        format: JobFormat,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let engine = self
            .engine_for(format)
            .ok_or_else(|| PdfsrvError::Unconvertible(format.to_string()))?;

        let started = Instant::now();
        let input = spool_job(job, format).await?;
        let output = reserve_output_path(&self.output_dir, &Local::now()).await?;

        debug!(
            job_id = %job.id,
            engine,
            input = %input.path().display(),
            output = %output.display(),
            "starting rendering engine"
        );

        match run_engine(engine, input.path(), &output, cancel).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    engine,
                    format = %format,
                    path = %output.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "converted to PDF"
                );
                Ok(output)
            }
            Err(e) => {
                discard_output(&output).await;
                Err(e)
            }
        }
        // `input` is dropped here, deleting the spooled job.
    }
}

/// Write the job bytes to a temporary file that is deleted on drop.
async fn spool_job(job: &Job, format: JobFormat) -> Result<tempfile::NamedTempFile> {
    let suffix = match format {
        JobFormat::PostScript => ".ps",
        JobFormat::Pcl => ".pcl",
        JobFormat::Unknown => ".bin",
    };
    let file = tempfile::Builder::new()
        .prefix("pdfsrv-job-")
        .suffix(suffix)
        .tempfile()?;
    tokio::fs::write(file.path(), job.bytes()).await?;
    Ok(file)
}

/// Run one engine to completion and check what it left behind.
async fn run_engine(
    engine: &str,
    input: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let child = Command::new(engine)
        .arg(PDF_DEVICE_ARG)
        .arg("-o")
        .arg(output)
        .arg(input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PdfsrvError::EngineNotFound {
                    engine: engine.to_string(),
                    reason: e.to_string(),
                }
            } else {
                PdfsrvError::Io(e)
            }
        })?;

    // Dropping the wait future drops the child, and kill_on_drop reaps it.
    let result = tokio::select! {
        result = child.wait_with_output() => result?,
        _ = cancel.cancelled() => {
            warn!(engine, "conversion cancelled, killing rendering engine");
            return Err(PdfsrvError::Cancelled);
        }
    };

    if !result.status.success() {
        let stderr = excerpt(&result.stderr);
        warn!(
            engine,
            exit_code = ?result.status.code(),
            stderr = %stderr,
            "rendering engine failed"
        );
        return Err(PdfsrvError::EngineFailed {
            engine: engine.to_string(),
            exit_code: result.status.code(),
            stderr,
        });
    }

    let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        warn!(engine, path = %output.display(), "rendering engine wrote no output");
        return Err(PdfsrvError::EmptyOutput {
            engine: engine.to_string(),
            path: output.display().to_string(),
        });
    }

    debug!(engine, bytes = written, "rendering engine finished");
    Ok(())
}

/// Remove a reserved or partially written PDF.
async fn discard_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed unusable output"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove unusable output"),
    }
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.chars().count() <= MAX_STDERR_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_STDERR_CHARS).collect();
        cut.push('…');
        cut
    }
}
