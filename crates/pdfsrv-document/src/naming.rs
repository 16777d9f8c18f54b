// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output file naming.
//
// PDFs are named after the local time the conversion started, to the second:
// `print_job_20260419_142501.pdf`.  Two jobs converted within the same
// second get a numeric suffix (`print_job_20260419_142501_1.pdf`) so the
// timestamp prefix stays human readable and sortable.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::debug;

use pdfsrv_core::error::{PdfsrvError, Result};

/// Prefix shared by every generated PDF.
pub const FILE_PREFIX: &str = "print_job_";

/// strftime pattern for the timestamp part of the name.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Upper bound on suffixes tried for one timestamp.
const MAX_SUFFIX: u32 = 10_000;

/// File name for a job converted at `at`.  `suffix` 0 means no suffix.
pub fn pdf_file_name<Tz: TimeZone>(at: &DateTime<Tz>, suffix: u32) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = at.format(TIMESTAMP_FORMAT);
    if suffix == 0 {
        format!("{FILE_PREFIX}{stamp}.pdf")
    } else {
        format!("{FILE_PREFIX}{stamp}_{suffix}.pdf")
    }
}

/// Claim a fresh output path in `dir` for a job converted at `at`.
///
/// The file is created empty and exclusively, so two concurrent jobs can
/// never be handed the same path.  The renderer overwrites it; callers that
/// fail to render must remove it again.
pub async fn reserve_output_path<Tz: TimeZone>(dir: &Path, at: &DateTime<Tz>) -> Result<PathBuf>
where
    Tz::Offset: std::fmt::Display,
{
    for suffix in 0..MAX_SUFFIX {
        let candidate = dir.join(pdf_file_name(at, suffix));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => {
                debug!(path = %candidate.display(), "reserved output path");
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(PdfsrvError::Io(e)),
        }
    }

    Err(PdfsrvError::OutputDir {
        path: dir.display().to_string(),
        reason: format!("no free file name for {}", at.format(TIMESTAMP_FORMAT)),
    })
}

/// Whether `name` looks like a file this crate generated.
pub fn is_job_file_name(name: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(FILE_PREFIX)
        .and_then(|r| r.strip_suffix(".pdf"))
    else {
        return false;
    };
    let bytes = rest.as_bytes();
    if bytes.len() < 15 {
        return false;
    }
    let stamp_ok = bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'_'
        && bytes[9..15].iter().all(u8::is_ascii_digit);
    let suffix_ok = match &rest[15..] {
        "" => true,
        tail => tail
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
    };
    stamp_ok && suffix_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, Utc};

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 19, 14, 25, 1).unwrap()
    }

    #[test]
    fn name_uses_second_granularity_timestamp() {
        assert_eq!(
            pdf_file_name(&fixed_time(), 0),
            "print_job_20260419_142501.pdf"
        );
        assert_eq!(
            pdf_file_name(&fixed_time(), 3),
            "print_job_20260419_142501_3.pdf"
        );
    }

    #[test]
    fn generated_names_are_recognised() {
        assert!(is_job_file_name(&pdf_file_name(&Local::now(), 0)));
        assert!(is_job_file_name("print_job_20260419_142501_12.pdf"));
        assert!(!is_job_file_name("print_job_2026041_142501.pdf"));
        assert!(!is_job_file_name("print_job_20260419_142501_.pdf"));
        assert!(!is_job_file_name("print_job_20260419-142501.pdf"));
        assert!(!is_job_file_name("scan_20260419_142501.pdf"));
    }

    #[test]
    fn one_second_apart_gives_distinct_names() {
        let first = fixed_time();
        let second = first + chrono::Duration::seconds(1);
        assert_ne!(pdf_file_name(&first, 0), pdf_file_name(&second, 0));
    }

    #[tokio::test]
    async fn same_second_reservations_get_suffixes() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let at = fixed_time();

        let a = reserve_output_path(dir.path(), &at).await.expect("first");
        let b = reserve_output_path(dir.path(), &at).await.expect("second");
        let c = reserve_output_path(dir.path(), &at).await.expect("third");

        assert_eq!(a.file_name().unwrap(), "print_job_20260419_142501.pdf");
        assert_eq!(b.file_name().unwrap(), "print_job_20260419_142501_1.pdf");
        assert_eq!(c.file_name().unwrap(), "print_job_20260419_142501_2.pdf");
        assert!(a.exists() && b.exists() && c.exists());
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let gone = dir.path().join("does-not-exist");
        let err = reserve_output_path(&gone, &fixed_time()).await.unwrap_err();
        assert!(matches!(err, PdfsrvError::Io(_)));
    }
}
