// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for hashing, certificate signing, and audit logging.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use trustwipe_security::{AuditLog, CertificateSigner, hash_bytes, verify_signature};

/// A certificate body is a few KiB; run logs can reach megabytes.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("4 KiB", 4 * 1024),
        ("64 KiB", 64 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| b.iter(|| black_box(hash_bytes(black_box(&data)))));
    }
    group.finish();
}

fn bench_sign_verify(c: &mut Criterion) {
    let signer = CertificateSigner::generate().expect("generate key");
    let public_key = signer.public_key_hex();
    let body = vec![b'{'; 4 * 1024];

    c.bench_function("sign certificate (4 KiB)", |b| {
        b.iter(|| black_box(signer.sign(black_box(&body)).expect("sign")));
    });

    let sig = signer.sign(&body).expect("sign");
    c.bench_function("verify certificate (4 KiB)", |b| {
        b.iter(|| verify_signature(&public_key, black_box(&body), &sig).expect("verify"));
    });
}

fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record (in-memory SQLite)", |b| {
        let log = AuditLog::open_in_memory().expect("open in-memory audit log");
        b.iter(|| {
            log.record(
                black_box("certificate.issue"),
                black_box("swc-2025-09-08-ABC123"),
                Some("abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890"),
                true,
                None,
            )
            .expect("record failed");
        });
    });
}

criterion_group!(benches, bench_integrity_hash, bench_sign_verify, bench_audit_record);
criterion_main!(benches);
