// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the per-job hot path in the pdfsrv-document crate:
// format sniffing and output file naming.

use chrono::Local;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use pdfsrv_document::naming::{is_job_file_name, pdf_file_name};
use pdfsrv_document::sniff;

/// Sniffing must not depend on job size; a 4 MiB job should cost the same
/// as a 4-byte one.
fn bench_sniff(c: &mut Criterion) {
    let mut postscript = b"%!PS-Adobe-3.0\n".to_vec();
    postscript.resize(4 * 1024 * 1024, b' ');
    let pcl = b"\x1bE\x1b&l0O".to_vec();
    let garbage = vec![0u8; 4 * 1024 * 1024];

    c.bench_function("sniff postscript (4 MiB)", |b| {
        b.iter(|| black_box(sniff(black_box(&postscript))));
    });
    c.bench_function("sniff pcl (7 B)", |b| {
        b.iter(|| black_box(sniff(black_box(&pcl))));
    });
    c.bench_function("sniff unknown (4 MiB)", |b| {
        b.iter(|| black_box(sniff(black_box(&garbage))));
    });
}

fn bench_naming(c: &mut Criterion) {
    let now = Local::now();

    c.bench_function("pdf_file_name", |b| {
        b.iter(|| black_box(pdf_file_name(black_box(&now), black_box(0))));
    });

    let name = pdf_file_name(&now, 17);
    c.bench_function("is_job_file_name", |b| {
        b.iter(|| black_box(is_job_file_name(black_box(&name))));
    });
}

criterion_group!(benches, bench_sniff, bench_naming);
criterion_main!(benches);
