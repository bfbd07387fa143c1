use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use groovy::{CompressionLevel, FrameEncoder};
use groovy_protocol::{compute_mode, ModeRequest, OutputFamily, PixelFormat};

const WIDTH: usize = 320;
const HEIGHT: usize = 240;

fn test_pattern(offset: usize) -> Vec<u8> {
    let mut frame = vec![0u8; WIDTH * HEIGHT * 3];
    for (i, px) in frame.chunks_exact_mut(3).enumerate() {
        let x = i % WIDTH;
        let y = i / WIDTH;
        px[0] = ((x + offset) / 8 * 32) as u8;
        px[1] = (y / 8 * 16) as u8;
        px[2] = if (x / 16 + y / 16) % 2 == 0 { 0xff } else { 0 };
    }
    frame
}

fn encoder(level: CompressionLevel) -> FrameEncoder {
    let timing = compute_mode(&ModeRequest {
        width: WIDTH as u16,
        height: HEIGHT as u16,
        refresh_hz: 60.0,
        family: OutputFamily::Auto,
        progressive_buffer: false,
    });
    let mut encoder = FrameEncoder::new(level, true, PixelFormat::Rgb888);
    encoder.set_mode(&timing);
    encoder
}

fn bench_prepare_field(c: &mut Criterion) {
    let frame = test_pattern(0);
    let mut group = c.benchmark_group("prepare_field");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("rgb888_first", |b| {
        let mut encoder = encoder(CompressionLevel::Raw);
        b.iter(|| {
            encoder.reset_delta();
            black_box(encoder.prepare_field(black_box(&frame), 0));
        });
    });

    group.bench_function("rgb888_delta", |b| {
        let mut encoder = encoder(CompressionLevel::Raw);
        let prepared = encoder.prepare_field(&frame, 0);
        encoder.encode(&prepared);
        b.iter(|| {
            black_box(encoder.prepare_field(black_box(&frame), 0));
        });
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let frames = [test_pattern(0), test_pattern(1)];
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(frames[0].len() as u64));

    for level in [
        CompressionLevel::Fast,
        CompressionLevel::FastDelta,
        CompressionLevel::High,
        CompressionLevel::HighDelta,
    ] {
        group.bench_function(format!("level_{}", level.as_u8()), |b| {
            let mut encoder = encoder(level);
            let mut n = 0;
            b.iter(|| {
                let prepared = encoder.prepare_field(&frames[n % 2], 0);
                n += 1;
                let encoded = encoder.encode(&prepared);
                black_box(encoder.payload(&encoded).len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_prepare_field, bench_encode);
criterion_main!(benches);
