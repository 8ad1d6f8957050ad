//! Benchmarks for record encoding
//!
//! Measures listing encode/decode cost for growing device counts.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use records::{BusType, DeviceRecord, decode_listing, encode_listing};

fn make_listing(count: usize) -> Vec<DeviceRecord> {
    (0..count)
        .map(|i| DeviceRecord {
            path: format!("1-{}:1.0", i + 1),
            vendor_id: 0x1234,
            product_id: i as u16,
            serial_number: format!("SN{:06}", i),
            release_number: 0x0100,
            manufacturer_string: "Bench Manufacturer".to_string(),
            product_string: format!("Bench Device {}", i),
            usage_page: 0x0001,
            usage: 0x0006,
            interface_number: 0,
            bus_type: BusType::Usb,
        })
        .collect()
}

fn benchmark_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");

    for count in [1usize, 16, 128] {
        let listing = make_listing(count);
        let bytes = encode_listing(&listing).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &listing, |b, listing| {
            b.iter(|| encode_listing(black_box(listing)))
        });

        group.bench_with_input(BenchmarkId::new("decode", count), &bytes, |b, bytes| {
            b.iter(|| decode_listing(black_box(bytes)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_listing);
criterion_main!(benches);
