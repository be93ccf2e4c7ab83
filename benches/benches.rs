use std::io::Cursor;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mb1::transport::ReadTransport;
use mb1::{
    compute_checksum, validate_checksum, Beam, ByteOrder, Frame, ReadFlags, Reader,
    MAX_BEAMS, MAX_FRAME_BYTES,
};
use rand::Rng;

fn full_frame(ping: i32) -> Frame {
    let mut rng = rand::thread_rng();
    let beams = (0..MAX_BEAMS)
        .map(|i| Beam::new(i, rng.gen(), rng.gen(), rng.gen()))
        .collect();
    Frame::new(ping, 1_700_000_000.0, 36.8, -121.9, 1000.0, 90.0, beams)
}

fn bench_checksum(c: &mut Criterion) {
    let dat = full_frame(0).encode(ByteOrder::Little);

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(dat.len() as u64));
    group.bench_function("compute", |b| {
        b.iter(|| compute_checksum(&dat, ByteOrder::Little));
    });
    group.bench_function("validate", |b| {
        b.iter(|| validate_checksum(&dat, ByteOrder::Little));
    });
    group.finish();
}

fn bench_read_frames(c: &mut Criterion) {
    let count = 100;
    let dat: Vec<u8> = (0..count)
        .flat_map(|i| full_frame(i).encode(ByteOrder::Little))
        .collect();

    // garbage in front of every frame forces a resync per frame
    let mut rng = rand::thread_rng();
    let noisy: Vec<u8> = (0..count)
        .flat_map(|i| {
            let mut chunk: Vec<u8> = (0..200).map(|_| rng.gen_range(0..b'M')).collect();
            chunk.extend(full_frame(i).encode(ByteOrder::Little));
            chunk
        })
        .collect();

    let mut group = c.benchmark_group("reader");
    for (name, input) in [("clean", dat), ("resync", noisy)] {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    Reader::with_transport(
                        Box::new(ReadTransport::new(Cursor::new(input.clone()))),
                        MAX_FRAME_BYTES,
                    )
                },
                |mut reader| {
                    let mut buf = vec![0u8; MAX_FRAME_BYTES];
                    let mut n = 0;
                    while reader
                        .read_frame(&mut buf, ReadFlags::default(), 0.0, Duration::ZERO)
                        .is_ok()
                    {
                        n += 1;
                    }
                    assert_eq!(n, count);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_read_frames);
criterion_main!(benches);
