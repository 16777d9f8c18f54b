// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfsrv Print: the network side of the virtual printer: a raw-port
// (JetDirect, 9100) server that turns each connection into one job, the
// collector that drains a connection, and a raw-port client for submitting
// jobs.

pub mod collector;
pub mod raw_client;
pub mod raw_server;

pub use collector::{CollectLimits, collect_job};
pub use raw_client::send_raw;
pub use raw_server::{RawServer, dispatch_job};
