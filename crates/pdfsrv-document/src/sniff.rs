// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page description language detection.
//
// Raw-port jobs carry no metadata, so the only way to know what a driver
// sent is to look at the first bytes: PostScript documents open with the
// `%!PS` comment and every PCL command opens with ESC.

use pdfsrv_core::types::JobFormat;

/// Leading bytes of a PostScript document.
pub const POSTSCRIPT_MARKER: &[u8; 4] = b"%!PS";

/// ESC, the first byte of every PCL command.
pub const PCL_ESCAPE: u8 = 0x1B;

/// Classify a job from its leading bytes.
///
/// Looks at no more than the first four bytes.  Buffers shorter than the
/// PostScript marker, including the empty buffer, are never an error.
pub fn sniff(data: &[u8]) -> JobFormat {
    if data.starts_with(POSTSCRIPT_MARKER) {
        JobFormat::PostScript
    } else if data.first() == Some(&PCL_ESCAPE) {
        JobFormat::Pcl
    } else {
        JobFormat::Unknown
    }
}
