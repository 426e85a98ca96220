use criterion::{criterion_group, criterion_main, Criterion};
use ovakit_package::{build_manifest, HashAlgorithm};
use std::fs;
use std::path::{Path, PathBuf};

fn create_payloads(dir: &Path, count: usize, size: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("payload{i}.bin"));
            let data: Vec<u8> = (0..size).map(|b| ((b + i) % 251) as u8).collect();
            fs::write(&path, data).unwrap();
            path
        })
        .collect()
}

fn bench_manifest_sha256(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let paths = create_payloads(dir.path(), 8, 4 * 1024 * 1024);
    c.bench_function("manifest_sha256_8x4mib", |b| {
        b.iter(|| build_manifest(HashAlgorithm::Sha256, &paths).unwrap());
    });
}

fn bench_manifest_sha512_single(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let paths = create_payloads(dir.path(), 1, 16 * 1024 * 1024);
    c.bench_function("manifest_sha512_1x16mib", |b| {
        b.iter(|| build_manifest(HashAlgorithm::Sha512, &paths).unwrap());
    });
}

criterion_group!(benches, bench_manifest_sha256, bench_manifest_sha512_single);
criterion_main!(benches);
