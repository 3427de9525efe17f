use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rowvault::protect::{decrypt_field, encrypt_field, hash_field};
use rowvault::{generate_protection_key, KeyProvider, StaticKeyProvider};

fn benchmark_field_protection(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_protection");

    let provider = StaticKeyProvider::new(generate_protection_key().unwrap());
    let (version, key) = provider.active().unwrap();

    // Field sizes representative of names, emails, and free-text columns.
    let sizes = [("16B", 16), ("64B", 64), ("1KB", 1024)];

    for (name, size) in sizes {
        let value = "x".repeat(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            criterion::BenchmarkId::new("encrypt", name),
            &value,
            |b, value| {
                b.iter(|| encrypt_field(black_box(Some(value)), version, &key).unwrap());
            },
        );

        let token = encrypt_field(Some(&value), version, &key).unwrap().unwrap();
        group.bench_with_input(
            criterion::BenchmarkId::new("decrypt", name),
            &token,
            |b, token| {
                b.iter(|| decrypt_field(black_box(Some(token)), &provider).unwrap());
            },
        );

        group.bench_with_input(
            criterion::BenchmarkId::new("hash", name),
            &value,
            |b, value| {
                b.iter(|| hash_field(black_box(Some(value))).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_field_protection);
criterion_main!(benches);
