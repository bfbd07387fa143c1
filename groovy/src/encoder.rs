//! Field preparation and adaptive compression
//!
//! The encoder keeps one buffer per field parity. Preparing a field packs
//! the source rows into that buffer and, when delta fields are in use,
//! writes the byte-wise difference against the previous contents into a
//! scratch buffer while counting unchanged bytes.
//!
//! Encoding then picks exactly one representation for the field:
//!
//! 1. The field is compressed on its own unless it is an exact repeat at
//!    a delta level, in which case the field size is the baseline.
//! 2. A delta is tried when the plain result is not already excellent
//!    (ratio above 5%) and enough bytes matched (above 20% and above
//!    `0.9 - ratio`). It is kept only if it is under 95% of the baseline.
//! 3. Adaptive levels recompress anything over [`ADAPTIVE_CEILING`] with
//!    the high ratio compressor and stay on it for the rest of the session.
//! 4. A field that does not compress is sent raw, or as a duplicate marker
//!    when it is an exact repeat.

use crate::options::{CompressionLevel, Compressor};
use groovy_protocol::{ModeTiming, PayloadKind, PixelFormat};

/// Largest field the device accepts (720x576 at 4 bytes per pixel)
pub const MAX_FIELD_SIZE: usize = 720 * 576 * 4;

/// Compressed size above which adaptive levels fall back to HC
pub const ADAPTIVE_CEILING: usize = 600_000;

const DELTA_MIN_RATIO: f64 = 0.05;
const DELTA_MIN_MATCH: f64 = 0.20;
const DELTA_MATCH_OFFSET: f64 = 0.9;
const DELTA_ACCEPT_RATIO: f64 = 0.95;

/// Bytes per source pixel (packed RGB888)
const SOURCE_BPP: usize = 3;

/// Result of packing one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedField {
    pub field: u8,
    /// Field size in bytes
    pub size: usize,
    /// Bytes equal to the previous field of the same parity
    pub matched: usize,
    /// Whether the delta scratch holds a difference against a sent field
    pub delta: bool,
}

impl PreparedField {
    pub fn match_ratio(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.matched as f64 / self.size as f64
        }
    }

    /// Identical to the previous field of the same parity
    pub fn is_repeat(&self) -> bool {
        self.delta && self.matched == self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Field(u8),
    Compressed,
    Delta,
    Empty,
}

/// Chosen representation of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedField {
    pub kind: PayloadKind,
    /// Uncompressed field size
    pub field_size: usize,
    /// Set when this field triggered the adaptive fallback
    pub downgraded: bool,
    body: Body,
}

impl EncodedField {
    /// Bytes to stream after the header
    pub fn body_len(&self) -> usize {
        match self.kind {
            PayloadKind::Raw => self.field_size,
            PayloadKind::Compressed { len } | PayloadKind::Delta { len } => len as usize,
            PayloadKind::Duplicate => 0,
        }
    }
}

/// Packs and compresses fields for one session
pub struct FrameEncoder {
    level: CompressionLevel,
    delta_frames: bool,
    pixel_format: PixelFormat,
    width: usize,
    lines: usize,
    progressive: bool,
    field_size: usize,
    fields: [Vec<u8>; 2],
    delta: Vec<u8>,
    row: Vec<u8>,
    compressed: Vec<u8>,
    compressed_delta: Vec<u8>,
    delta_enabled: [bool; 2],
}

impl FrameEncoder {
    pub fn new(level: CompressionLevel, delta_frames: bool, pixel_format: PixelFormat) -> Self {
        FrameEncoder {
            level,
            delta_frames,
            pixel_format,
            width: 0,
            lines: 0,
            progressive: true,
            field_size: 0,
            fields: [Vec::new(), Vec::new()],
            delta: Vec::new(),
            row: Vec::new(),
            compressed: Vec::new(),
            compressed_delta: Vec::new(),
            delta_enabled: [false; 2],
        }
    }

    /// Size buffers for a new mode and forget previous fields
    pub fn set_mode(&mut self, timing: &ModeTiming) {
        self.width = timing.mode.h_active as usize;
        self.lines = timing.field_lines() as usize;
        self.progressive = timing.buffer_progressive;
        self.field_size =
            (self.width * self.lines * self.pixel_format.bytes_per_pixel()).min(MAX_FIELD_SIZE);

        for buf in self.fields.iter_mut() {
            buf.clear();
            buf.resize(self.field_size, 0);
        }
        self.delta.resize(self.field_size, 0);
        self.row.resize(self.width * self.pixel_format.bytes_per_pixel(), 0);
        self.reset_delta();
    }

    /// Force the next field of each parity to be sent without delta
    pub fn reset_delta(&mut self) {
        self.delta_enabled = [false; 2];
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn field_size(&self) -> usize {
        self.field_size
    }

    /// Current contents of a field buffer
    pub fn field(&self, field: u8) -> &[u8] {
        &self.fields[(field & 1) as usize]
    }

    pub fn delta_enabled(&self, field: u8) -> bool {
        self.delta_enabled[(field & 1) as usize]
    }

    fn delta_allowed(&self, field: usize) -> bool {
        self.delta_frames && self.delta_enabled[field]
    }

    /// Pack `source` into the buffer for `field`
    ///
    /// `source` is a progressive RGB888 frame, `width * 3` bytes per row.
    /// For interlaced buffers every other row is taken, starting at `field`.
    /// Missing source rows are packed as black.
    pub fn prepare_field(&mut self, source: &[u8], field: u8) -> PreparedField {
        let parity = (field & 1) as usize;
        let stride = self.width * SOURCE_BPP;
        let out_stride = self.row.len();
        let delta = self.delta_allowed(parity);
        let (first, step) = if self.progressive {
            (0, 1)
        } else {
            (parity, 2)
        };

        let mut matched = 0;
        for line in 0..self.lines {
            let src_line = first + line * step;
            let src_row = source.get(src_line * stride..(src_line + 1) * stride);
            pack_row(self.pixel_format, src_row, &mut self.row);

            let start = line * out_stride;
            let end = start + out_stride;
            if end > self.field_size {
                break;
            }
            let dst = &mut self.fields[parity][start..end];
            if delta {
                let scratch = &mut self.delta[start..end];
                for ((old, d), new) in dst.iter_mut().zip(scratch.iter_mut()).zip(&self.row) {
                    *d = new.wrapping_sub(*old);
                    matched += (*d == 0) as usize;
                    *old = *new;
                }
            } else {
                dst.copy_from_slice(&self.row);
            }
        }

        PreparedField {
            field: parity as u8,
            size: self.field_size,
            matched,
            delta,
        }
    }

    /// Choose the representation for a prepared field
    ///
    /// Marks the field parity as delta capable for the next frame.
    pub fn encode(&mut self, prepared: &PreparedField) -> EncodedField {
        let parity = prepared.field as usize;
        let size = prepared.size;
        let raw = EncodedField {
            kind: PayloadKind::Raw,
            field_size: size,
            downgraded: false,
            body: Body::Field(prepared.field),
        };

        let encoded = match self.level.compressor() {
            Some(compressor) if size > 0 => self.compress_field(compressor, prepared, raw),
            _ => raw,
        };

        let encoded = if encoded.kind == PayloadKind::Raw && prepared.is_repeat() {
            EncodedField {
                kind: PayloadKind::Duplicate,
                body: Body::Empty,
                ..encoded
            }
        } else {
            encoded
        };

        self.delta_enabled[parity] = true;
        encoded
    }

    fn compress_field(
        &mut self,
        compressor: Compressor,
        prepared: &PreparedField,
        raw: EncodedField,
    ) -> EncodedField {
        let parity = prepared.field as usize;
        let size = prepared.size;
        let match_ratio = prepared.match_ratio();

        let try_delta = prepared.delta && self.level.uses_delta();

        // An exact repeat will go out as a delta; skip compressing it whole
        let plain = if try_delta && prepared.is_repeat() {
            None
        } else {
            Some(compressor.compress(&self.fields[parity], &mut self.compressed))
        };

        // Baseline the delta must beat; 0 when the field did not compress
        let baseline = match plain {
            None => size,
            Some(result) => result.unwrap_or(0),
        };
        let ratio = baseline as f64 / size as f64;

        let mut chosen = None;
        if try_delta
            && ratio > DELTA_MIN_RATIO
            && match_ratio > DELTA_MIN_MATCH
            && match_ratio > DELTA_MATCH_OFFSET - ratio
        {
            if let Some(len) = compressor.compress(&self.delta, &mut self.compressed_delta) {
                if (len as f64 / baseline as f64) < DELTA_ACCEPT_RATIO {
                    chosen = Some(self.encoded(raw, Body::Delta, len));
                }
            }
        }

        let chosen = match (chosen, plain) {
            (Some(delta), _) => delta,
            (None, Some(Some(len))) => self.encoded(raw, Body::Compressed, len),
            (None, Some(None)) => raw,
            (None, None) => {
                // the whole-field pass was skipped for a rejected delta
                match compressor.compress(&self.fields[parity], &mut self.compressed) {
                    Some(len) => self.encoded(raw, Body::Compressed, len),
                    None => raw,
                }
            }
        };

        if self.level.is_adaptive()
            && chosen.kind != PayloadKind::Raw
            && chosen.body_len() > ADAPTIVE_CEILING
        {
            return self.adaptive_fallback(chosen, raw, parity);
        }
        chosen
    }

    fn adaptive_fallback(
        &mut self,
        chosen: EncodedField,
        raw: EncodedField,
        parity: usize,
    ) -> EncodedField {
        let previous = self.level;
        self.level = self.level.downgraded();
        tracing::warn!(
            "field of {} bytes over adaptive ceiling, compression level {} -> {}",
            chosen.body_len(),
            previous.as_u8(),
            self.level.as_u8()
        );

        let recompressed = match chosen.body {
            Body::Delta => Compressor::High
                .compress(&self.delta, &mut self.compressed_delta)
                .map(|len| self.encoded(raw, Body::Delta, len)),
            _ => Compressor::High
                .compress(&self.fields[parity], &mut self.compressed)
                .map(|len| self.encoded(raw, Body::Compressed, len)),
        };

        // HC never loses to the fast pass in practice; keep the fast result if it did
        let result = match recompressed {
            Some(better) if better.body_len() <= chosen.body_len() => better,
            _ => chosen,
        };
        EncodedField {
            downgraded: true,
            ..result
        }
    }

    fn encoded(&self, raw: EncodedField, body: Body, len: usize) -> EncodedField {
        let len = len as u32;
        let kind = match body {
            Body::Delta => PayloadKind::Delta { len },
            _ => PayloadKind::Compressed { len },
        };
        EncodedField { kind, body, ..raw }
    }

    /// Bytes to stream for an encoded field
    pub fn payload(&self, encoded: &EncodedField) -> &[u8] {
        match encoded.body {
            Body::Field(field) => &self.fields[(field & 1) as usize][..encoded.field_size],
            Body::Compressed => &self.compressed[..encoded.body_len()],
            Body::Delta => &self.compressed_delta[..encoded.body_len()],
            Body::Empty => &[],
        }
    }
}

/// Pack one RGB888 row into the wire pixel format
fn pack_row(format: PixelFormat, src: Option<&[u8]>, out: &mut [u8]) {
    let Some(src) = src else {
        out.fill(0);
        return;
    };

    match format {
        PixelFormat::Rgb888 => out.copy_from_slice(&src[..out.len()]),
        PixelFormat::Rgba8888 => {
            for (px, rgb) in out.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                px[..3].copy_from_slice(rgb);
                px[3] = 0;
            }
        }
        PixelFormat::Rgb565 => {
            for (px, rgb) in out.chunks_exact_mut(2).zip(src.chunks_exact(3)) {
                let value = ((rgb[0] as u16 >> 3) << 11)
                    | ((rgb[1] as u16 >> 2) << 5)
                    | (rgb[2] as u16 >> 3);
                px.copy_from_slice(&value.to_le_bytes());
            }
        }
    }
}
