// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for pdfsrv.

use thiserror::Error;

use crate::types::ErrorClass;

/// Top-level error type for all pdfsrv operations.
#[derive(Debug, Error)]
pub enum PdfsrvError {
    // -- Startup errors --
    #[error("failed to bind listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("output directory {path} unusable: {reason}")]
    OutputDir { path: String, reason: String },

    // -- Transport errors --
    #[error("read from client failed: {0}")]
    Transport(String),

    #[error("job exceeds the {limit}-byte limit")]
    JobTooLarge { limit: u64 },

    #[error("client idle for more than {secs}s")]
    IdleTimeout { secs: u64 },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    // -- Conversion errors --
    #[error("format {0} cannot be converted to PDF")]
    Unconvertible(String),

    #[error("rendering engine `{engine}` not found: {reason}")]
    EngineNotFound { engine: String, reason: String },

    #[error("rendering engine `{engine}` failed (exit {exit_code:?}): {stderr}")]
    EngineFailed {
        engine: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("rendering engine `{engine}` produced no output at {path}")]
    EmptyOutput { engine: String, path: String },

    // -- Generic --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PdfsrvError {
    /// Which failure family this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Bind { .. } | Self::Config(_) | Self::OutputDir { .. } => ErrorClass::Startup,
            Self::Transport(_)
            | Self::JobTooLarge { .. }
            | Self::IdleTimeout { .. }
            | Self::Cancelled => ErrorClass::Transport,
            Self::Unconvertible(_)
            | Self::EngineNotFound { .. }
            | Self::EngineFailed { .. }
            | Self::EmptyOutput { .. } => ErrorClass::Conversion,
            Self::Io(_) => ErrorClass::Conversion,
            Self::Serialization(_) => ErrorClass::Startup,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PdfsrvError>;
