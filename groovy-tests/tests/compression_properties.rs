//! Property-based tests for field encoding
//!
//! A small model of the device rebuilds every field from what the encoder
//! would put on the wire and checks it against the source.

use groovy::compress::{apply_delta, decompress_block};
use groovy::{CompressionLevel, FrameEncoder};
use groovy_protocol::{compute_mode, ModeRequest, OutputFamily, PayloadKind, PixelFormat};
use proptest::prelude::*;

const WIDTH: usize = 256;
const HEIGHT: usize = 224;

/// Field buffers as the device holds them
struct DeviceModel {
    fields: [Vec<u8>; 2],
}

impl DeviceModel {
    fn new(size: usize) -> Self {
        DeviceModel {
            fields: [vec![0; size], vec![0; size]],
        }
    }

    fn receive(&mut self, field: u8, kind: PayloadKind, body: &[u8]) {
        let target = &mut self.fields[field as usize];
        match kind {
            PayloadKind::Raw => target.copy_from_slice(body),
            PayloadKind::Compressed { len } => {
                assert_eq!(len as usize, body.len());
                *target = decompress_block(body, target.len()).unwrap();
            }
            PayloadKind::Delta { len } => {
                assert_eq!(len as usize, body.len());
                let delta = decompress_block(body, target.len()).unwrap();
                apply_delta(target, &delta);
            }
            PayloadKind::Duplicate => assert!(body.is_empty()),
        }
    }
}

fn level_strategy() -> impl Strategy<Value = CompressionLevel> {
    (0u8..=6).prop_map(|level| CompressionLevel::from_u8(level).unwrap())
}

fn format_strategy() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::Rgb888),
        Just(PixelFormat::Rgba8888),
        Just(PixelFormat::Rgb565),
    ]
}

/// A frame described by how many rows differ from a fixed background
fn frame(seed: u8, changed_rows: usize) -> Vec<u8> {
    let mut frame = vec![0u8; WIDTH * HEIGHT * 3];
    for (i, px) in frame.chunks_exact_mut(3).enumerate() {
        let x = i % WIDTH;
        let y = i / WIDTH;
        let changed = y < changed_rows;
        let salt = if changed { seed as usize } else { 0 };
        px[0] = ((x / 4 + salt) * 7) as u8;
        px[1] = ((y / 2 + salt * 3) ^ x) as u8;
        px[2] = if changed { (x * y + salt) as u8 } else { 0x40 };
    }
    frame
}

fn encoder(level: CompressionLevel, format: PixelFormat) -> FrameEncoder {
    let timing = compute_mode(&ModeRequest {
        width: WIDTH as u16,
        height: HEIGHT as u16,
        refresh_hz: 60.0,
        family: OutputFamily::Auto,
        progressive_buffer: false,
    });
    let mut encoder = FrameEncoder::new(level, true, format);
    encoder.set_mode(&timing);
    encoder
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_device_rebuilds_every_field(
        level in level_strategy(),
        format in format_strategy(),
        frames in prop::collection::vec((any::<u8>(), 0usize..=HEIGHT), 1..6),
    ) {
        let mut encoder = encoder(level, format);
        let mut device = DeviceModel::new(encoder.field_size());

        for (seed, changed_rows) in frames {
            let prepared = encoder.prepare_field(&frame(seed, changed_rows), 0);
            let encoded = encoder.encode(&prepared);
            device.receive(0, encoded.kind, encoder.payload(&encoded));
            prop_assert_eq!(&device.fields[0][..], encoder.field(0));
        }
    }

    #[test]
    fn prop_repeat_is_duplicate(
        level in level_strategy(),
        seed in any::<u8>(),
        changed_rows in 0usize..=HEIGHT,
    ) {
        let mut encoder = encoder(level, PixelFormat::Rgb888);
        let source = frame(seed, changed_rows);

        let first = encoder.prepare_field(&source, 0);
        encoder.encode(&first);

        let again = encoder.prepare_field(&source, 0);
        prop_assert_eq!(again.match_ratio(), 1.0);
        prop_assert!(again.is_repeat());

        let encoded = encoder.encode(&again);
        if level == CompressionLevel::Raw || level.uses_delta() {
            let announced = encoded.kind.announced_len().unwrap_or(0) as usize;
            prop_assert!(encoded.kind.is_duplicate() || announced < encoded.field_size / 100);
        }
        if encoded.kind.is_duplicate() {
            prop_assert!(encoder.payload(&encoded).is_empty());
        }
    }

    #[test]
    fn prop_body_never_exceeds_field(
        level in level_strategy(),
        frames in prop::collection::vec((any::<u8>(), 0usize..=HEIGHT), 1..4),
    ) {
        let mut encoder = encoder(level, PixelFormat::Rgb888);
        for (seed, changed_rows) in frames {
            let prepared = encoder.prepare_field(&frame(seed, changed_rows), 0);
            let encoded = encoder.encode(&prepared);
            prop_assert!(encoded.body_len() <= encoded.field_size);
            prop_assert_eq!(encoder.payload(&encoded).len(), encoded.body_len());
        }
    }
}

#[test]
fn test_raw_level_never_compresses() {
    let mut encoder = encoder(CompressionLevel::Raw, PixelFormat::Rgb888);
    for seed in 0..4 {
        let prepared = encoder.prepare_field(&frame(seed, HEIGHT / 2), 0);
        let encoded = encoder.encode(&prepared);
        assert!(matches!(encoded.kind, PayloadKind::Raw | PayloadKind::Duplicate));
    }
}

#[test]
fn test_even_level_uses_delta_for_small_change() {
    let mut encoder = encoder(CompressionLevel::HighDelta, PixelFormat::Rgb888);
    let first = encoder.prepare_field(&frame(1, 8), 0);
    encoder.encode(&first);

    let second = encoder.prepare_field(&frame(2, 8), 0);
    assert!(second.match_ratio() > 0.9);
    let encoded = encoder.encode(&second);
    assert!(matches!(encoded.kind, PayloadKind::Delta { .. }));
}
