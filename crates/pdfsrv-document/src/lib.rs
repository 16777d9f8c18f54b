// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pdfsrv-document: everything that happens to a job after its connection
// closes: format detection, output file naming, and rendering to PDF through
// Ghostscript / GhostPCL.

pub mod convert;
pub mod naming;
pub mod sniff;

pub use convert::PdfConverter;
pub use sniff::sniff;
