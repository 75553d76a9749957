//! Benchmarks for the byte stream and heap layers.
//!
//! - Chunked writes of compressed integers at several chunk sizes
//! - Compressed integer decoding
//! - `#Strings` heap serialization with suffix folding
//! - Full metadata serialization and parsing

extern crate metascope;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use metascope::{
    builder::{MetadataBuilder, MetadataRootBuilder, RowValue},
    metadata::{handles::EntityHandle, tables::TableId, MetadataReader},
    BlobBuilder, BlobReader,
};
use std::hint::black_box;

/// Benchmark appending 10k compressed integers across chunk sizes.
fn bench_write_compressed(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_compressed");
    for chunk_size in [16usize, 256, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut builder = BlobBuilder::with_capacity(chunk_size);
                    for value in 0..10_000u32 {
                        builder.write_compressed_integer(black_box(value * 31)).unwrap();
                    }
                    black_box(builder.count())
                });
            },
        );
    }
    group.finish();
}

/// Benchmark decoding 10k compressed integers of mixed widths.
fn bench_read_compressed(c: &mut Criterion) {
    let mut builder = BlobBuilder::new();
    for value in 0..10_000u32 {
        builder.write_compressed_integer(value * 31).unwrap();
    }
    let data = builder.to_vec().unwrap();

    c.bench_function("read_compressed", |b| {
        b.iter(|| {
            let mut reader = BlobReader::new(black_box(&data));
            let mut sum = 0u64;
            while reader.has_more_data() {
                sum += u64::from(reader.read_compressed_integer().unwrap());
            }
            black_box(sum)
        });
    });
}

fn type_refs(count: u32) -> MetadataBuilder {
    let mut metadata = MetadataBuilder::new();
    for index in 0..count {
        let namespace = metadata.intern_string(&format!("Namespace{}", index % 17));
        let name = metadata.intern_string(&format!("Type{index}"));
        let suffix = metadata.intern_string(&format!("{index}"));
        metadata
            .add_row(
                TableId::TypeRef,
                vec![
                    RowValue::Entity(EntityHandle::nil(TableId::Module)),
                    RowValue::String(name),
                    RowValue::String(if index % 2 == 0 { namespace } else { suffix }),
                ],
            )
            .unwrap();
    }
    metadata
}

/// Benchmark heap folding and serialization of 5k type references.
fn bench_serialize_metadata(c: &mut Criterion) {
    c.bench_function("serialize_metadata", |b| {
        b.iter(|| {
            let root = MetadataRootBuilder::new(type_refs(5_000), None, false).unwrap();
            let mut out = BlobBuilder::new();
            root.serialize(&mut out).unwrap();
            black_box(out.count())
        });
    });
}

/// Benchmark parsing serialized metadata and resolving every type name.
fn bench_read_metadata(c: &mut Criterion) {
    let root = MetadataRootBuilder::new(type_refs(5_000), None, false).unwrap();
    let mut out = BlobBuilder::new();
    root.serialize(&mut out).unwrap();
    let data = out.to_vec().unwrap();

    c.bench_function("read_metadata", |b| {
        b.iter(|| {
            let reader = MetadataReader::read(black_box(&data)).unwrap();
            let table = reader.tables().table(TableId::TypeRef).unwrap();
            let mut total = 0usize;
            for row in table.iter() {
                total += reader.strings().resolve(row.string(1).unwrap()).unwrap().len();
            }
            black_box(total)
        });
    });
}

criterion_group!(
    benches,
    bench_write_compressed,
    bench_read_compressed,
    bench_serialize_metadata,
    bench_read_metadata
);
criterion_main!(benches);
