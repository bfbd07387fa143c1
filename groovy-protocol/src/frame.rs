//! Blit header
//!
//! Each field is announced by a BLIT_FIELD_VSYNC header whose trailing bytes
//! depend on how the body is encoded:
//!
//! | Payload    | Size | Trailer                  |
//! |------------|------|--------------------------|
//! | raw        | 8    | none                     |
//! | compressed | 12   | `len: u32`               |
//! | delta      | 13   | `len: u32`, `0x01`       |
//! | duplicate  | 9    | `0x01`                   |

use crate::command::{CodecError, CommandCode};
use bytes::{Buf, BufMut, BytesMut};

/// Size of the common part of a blit header, including the command byte
pub const BLIT_HEADER_SIZE: usize = 8;

/// How the field body is represented on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Uncompressed pixels; the device derives the length from the mode
    Raw,
    /// LZ4 block of the field
    Compressed { len: u32 },
    /// LZ4 block of the byte-wise difference against the previous field
    Delta { len: u32 },
    /// Field identical to the previous one of the same parity; no body
    Duplicate,
}

impl PayloadKind {
    /// Compressed body length announced in the header, if any
    pub fn announced_len(&self) -> Option<u32> {
        match self {
            PayloadKind::Compressed { len } | PayloadKind::Delta { len } => Some(*len),
            PayloadKind::Raw | PayloadKind::Duplicate => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PayloadKind::Duplicate)
    }
}

/// Header announcing one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame sequence number, starts at 1
    pub frame: u32,
    /// Field parity (0 or 1)
    pub field: u8,
    /// Scan line at which the device should present this field
    pub vsync_line: u16,
    pub payload: PayloadKind,
}

impl FrameHeader {
    /// Encoded size including the command byte
    pub fn encoded_len(&self) -> usize {
        match self.payload {
            PayloadKind::Raw => BLIT_HEADER_SIZE,
            PayloadKind::Duplicate => BLIT_HEADER_SIZE + 1,
            PayloadKind::Compressed { .. } => BLIT_HEADER_SIZE + 4,
            PayloadKind::Delta { .. } => BLIT_HEADER_SIZE + 5,
        }
    }

    /// Write everything after the command byte
    pub(crate) fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.frame);
        buf.put_u8(self.field);
        buf.put_u16_le(self.vsync_line);
        match self.payload {
            PayloadKind::Raw => {}
            PayloadKind::Compressed { len } => buf.put_u32_le(len),
            PayloadKind::Delta { len } => {
                buf.put_u32_le(len);
                buf.put_u8(0x01);
            }
            PayloadKind::Duplicate => buf.put_u8(0x01),
        }
    }

    /// Serialize with the BLIT_FIELD_VSYNC command byte
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(CommandCode::BlitFieldVsync.as_u8());
        self.encode_body(&mut buf);
        buf
    }

    /// Parse everything after the command byte
    pub(crate) fn decode_body(mut body: &[u8]) -> Result<Self, CodecError> {
        let total = body.len() + 1;
        if total < BLIT_HEADER_SIZE {
            return Err(CodecError::InsufficientData {
                expected: BLIT_HEADER_SIZE,
                actual: total,
            });
        }

        let frame = body.get_u32_le();
        let field = body.get_u8();
        let vsync_line = body.get_u16_le();
        let payload = match total {
            BLIT_HEADER_SIZE => PayloadKind::Raw,
            9 => PayloadKind::Duplicate,
            12 => PayloadKind::Compressed {
                len: body.get_u32_le(),
            },
            13 => PayloadKind::Delta {
                len: body.get_u32_le(),
            },
            other => return Err(CodecError::UnexpectedLength(other)),
        };

        Ok(FrameHeader {
            frame,
            field,
            vsync_line,
            payload,
        })
    }
}
