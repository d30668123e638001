use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use avrecord::audio::SampleAccumulator;

/// One second of 44.1 kHz stereo pushed in 1/60 s chunks, drained in
/// encoder frames of `frame_size`
fn regroup(c: &mut Criterion) {
    let chunk = vec![0x1234i16; 2 * 735];
    let mut group = c.benchmark_group("accumulator");
    group.throughput(Throughput::Elements(44100));

    for frame_size in [1024usize, 1152, 4096] {
        group.bench_function(format!("frame_{}", frame_size), |b| {
            let mut acc = SampleAccumulator::new(frame_size + 2 * 735, 2).unwrap();
            let mut frame = Vec::with_capacity(frame_size * 2);

            b.iter(|| {
                for _ in 0..60 {
                    if acc.push(black_box(&chunk)).is_err() {
                        acc.clear();
                    }
                    while acc.pop_exact(frame_size, &mut frame) {
                        black_box(&frame);
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, regroup);
criterion_main!(benches);
