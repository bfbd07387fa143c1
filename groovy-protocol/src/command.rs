//! Host-to-device command encoding
//!
//! Every datagram sent on the control socket starts with a one-byte command
//! code followed by a fixed little-endian layout. Bulk video and audio data
//! follow their header as separate MTU-sized datagrams and are not part of
//! the command itself.

use crate::frame::FrameHeader;
use crate::mode::{Interlace, VideoMode};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Largest command header in bytes (SWITCHRES)
pub const MAX_COMMAND_SIZE: usize = 26;

/// Command codes (first byte of every control datagram)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    Close = 1,
    Init = 2,
    SwitchRes = 3,
    Audio = 4,
    GetStatus = 5,
    BlitVsync = 6,
    BlitFieldVsync = 7,
    GetVersion = 8,
}

impl CommandCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommandCode::Close),
            2 => Some(CommandCode::Init),
            3 => Some(CommandCode::SwitchRes),
            4 => Some(CommandCode::Audio),
            5 => Some(CommandCode::GetStatus),
            6 => Some(CommandCode::BlitVsync),
            7 => Some(CommandCode::BlitFieldVsync),
            8 => Some(CommandCode::GetVersion),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Pixel packing used for the video payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum PixelFormat {
    /// 3 bytes per pixel
    #[default]
    Rgb888 = 0,
    /// 4 bytes per pixel, alpha byte unused
    Rgba8888 = 1,
    /// 2 bytes per pixel, little-endian 5-6-5
    Rgb565 = 2,
}

impl PixelFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PixelFormat::Rgb888),
            1 => Some(PixelFormat::Rgba8888),
            2 => Some(PixelFormat::Rgb565),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Bytes per packed pixel on the wire
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Map a PCM sample rate to the code carried by INIT
///
/// Only the three rates the device supports have a code; anything else
/// disables audio on the device side.
pub fn sound_rate_code(sample_rate: u32) -> u8 {
    match sample_rate {
        22050 => 1,
        44100 => 2,
        48000 => 3,
        _ => 0,
    }
}

/// INIT parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitParams {
    /// Whether video payloads may be LZ4 compressed
    pub compressed: bool,
    /// Encoded sample rate, see [`sound_rate_code`]
    pub sound_rate_code: u8,
    pub sound_channels: u8,
    pub pixel_format: PixelFormat,
}

/// A command sent from host to device
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Close,
    Init(InitParams),
    SwitchRes(VideoMode),
    /// Announces `size` bytes of PCM that follow in bulk datagrams
    Audio { size: u16 },
    GetStatus,
    Blit(FrameHeader),
    GetVersion,
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Close => CommandCode::Close,
            Command::Init(_) => CommandCode::Init,
            Command::SwitchRes(_) => CommandCode::SwitchRes,
            Command::Audio { .. } => CommandCode::Audio,
            Command::GetStatus => CommandCode::GetStatus,
            Command::Blit(_) => CommandCode::BlitFieldVsync,
            Command::GetVersion => CommandCode::GetVersion,
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        match self {
            Command::Close | Command::GetStatus | Command::GetVersion => 1,
            Command::Init(_) => 5,
            Command::SwitchRes(_) => MAX_COMMAND_SIZE,
            Command::Audio { .. } => 3,
            Command::Blit(header) => header.encoded_len(),
        }
    }

    /// Serialize the command (little-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.code().as_u8());
        match self {
            Command::Close | Command::GetStatus | Command::GetVersion => {}
            Command::Init(params) => {
                buf.put_u8(params.compressed as u8);
                buf.put_u8(params.sound_rate_code);
                buf.put_u8(params.sound_channels);
                buf.put_u8(params.pixel_format.as_u8());
            }
            Command::SwitchRes(mode) => {
                buf.put_f64_le(mode.pixel_clock);
                buf.put_u16_le(mode.h_active);
                buf.put_u16_le(mode.h_begin);
                buf.put_u16_le(mode.h_end);
                buf.put_u16_le(mode.h_total);
                buf.put_u16_le(mode.v_active);
                buf.put_u16_le(mode.v_begin);
                buf.put_u16_le(mode.v_end);
                buf.put_u16_le(mode.v_total);
                buf.put_u8(mode.interlace.as_u8());
            }
            Command::Audio { size } => buf.put_u16_le(*size),
            Command::Blit(header) => header.encode_body(buf),
        }
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode(&mut buf);
        buf
    }

    /// Parse a command datagram, as the device would
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (&code, mut body) = bytes.split_first().ok_or(CodecError::InsufficientData {
            expected: 1,
            actual: 0,
        })?;
        let code = CommandCode::from_u8(code).ok_or(CodecError::UnknownCommand(code))?;

        match code {
            CommandCode::Close => Ok(Command::Close),
            CommandCode::GetStatus => Ok(Command::GetStatus),
            CommandCode::GetVersion => Ok(Command::GetVersion),
            CommandCode::Init => {
                ensure_len(bytes, 5)?;
                let compressed = body.get_u8() != 0;
                let sound_rate_code = body.get_u8();
                let sound_channels = body.get_u8();
                let raw_format = body.get_u8();
                let pixel_format = PixelFormat::from_u8(raw_format)
                    .ok_or(CodecError::InvalidField("pixel_format", raw_format as u32))?;
                Ok(Command::Init(InitParams {
                    compressed,
                    sound_rate_code,
                    sound_channels,
                    pixel_format,
                }))
            }
            CommandCode::SwitchRes => {
                ensure_len(bytes, MAX_COMMAND_SIZE)?;
                let pixel_clock = body.get_f64_le();
                let h_active = body.get_u16_le();
                let h_begin = body.get_u16_le();
                let h_end = body.get_u16_le();
                let h_total = body.get_u16_le();
                let v_active = body.get_u16_le();
                let v_begin = body.get_u16_le();
                let v_end = body.get_u16_le();
                let v_total = body.get_u16_le();
                let raw_interlace = body.get_u8();
                let interlace = Interlace::from_u8(raw_interlace)
                    .ok_or(CodecError::InvalidField("interlace", raw_interlace as u32))?;
                Ok(Command::SwitchRes(VideoMode {
                    pixel_clock,
                    h_active,
                    h_begin,
                    h_end,
                    h_total,
                    v_active,
                    v_begin,
                    v_end,
                    v_total,
                    interlace,
                }))
            }
            CommandCode::Audio => {
                ensure_len(bytes, 3)?;
                Ok(Command::Audio {
                    size: body.get_u16_le(),
                })
            }
            CommandCode::BlitVsync | CommandCode::BlitFieldVsync => {
                Ok(Command::Blit(FrameHeader::decode_body(body)?))
            }
        }
    }
}

fn ensure_len(bytes: &[u8], expected: usize) -> Result<(), CodecError> {
    if bytes.len() < expected {
        return Err(CodecError::InsufficientData {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Wire decoding errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unknown command code: {0}")]
    UnknownCommand(u8),

    #[error("Invalid value for {0}: {1}")]
    InvalidField(&'static str, u32),

    #[error("Unexpected datagram length: {0}")]
    UnexpectedLength(usize),
}
