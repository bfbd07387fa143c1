//! Connection options

use crate::error::ConnectError;
use groovy_protocol::{OutputFamily, PixelFormat};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Default control/video port on the device
pub const DEFAULT_PORT: u16 = 32100;

/// Default input port on the device
pub const DEFAULT_INPUT_PORT: u16 = 32101;

/// Datagram payload used when no MTU is configured
pub const DEFAULT_MTU_PAYLOAD: usize = 1472;

/// IPv4 and UDP header bytes subtracted from a configured MTU
pub const IP_UDP_OVERHEAD: usize = 28;

/// Safety margin added to the vsync lead time
pub const DEFAULT_MARGIN_NS: u64 = 1_500_000;

/// How long the handshake waits for the device ACK
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 60;

/// Compression effort, 0 (raw) to 6
///
/// Odd levels compress only the field itself; even levels above zero also
/// consider a delta against the previous field of the same parity. Levels
/// 5 and 6 start with the fast compressor and fall back to the high ratio
/// one for good once a field exceeds the adaptive ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
#[repr(u8)]
pub enum CompressionLevel {
    Raw = 0,
    Fast = 1,
    FastDelta = 2,
    #[default]
    High = 3,
    HighDelta = 4,
    AdaptiveFast = 5,
    AdaptiveFastDelta = 6,
}

/// Block compressor backing a level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Fast,
    High,
}

impl CompressionLevel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionLevel::Raw),
            1 => Some(CompressionLevel::Fast),
            2 => Some(CompressionLevel::FastDelta),
            3 => Some(CompressionLevel::High),
            4 => Some(CompressionLevel::HighDelta),
            5 => Some(CompressionLevel::AdaptiveFast),
            6 => Some(CompressionLevel::AdaptiveFastDelta),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Compressor for this level, None for raw
    pub fn compressor(self) -> Option<Compressor> {
        match self {
            CompressionLevel::Raw => None,
            CompressionLevel::High | CompressionLevel::HighDelta => Some(Compressor::High),
            _ => Some(Compressor::Fast),
        }
    }

    /// Whether delta fields are considered
    pub fn uses_delta(self) -> bool {
        self != CompressionLevel::Raw && self.as_u8() % 2 == 0
    }

    pub fn is_adaptive(self) -> bool {
        matches!(
            self,
            CompressionLevel::AdaptiveFast | CompressionLevel::AdaptiveFastDelta
        )
    }

    /// Level used after an adaptive fallback
    pub fn downgraded(self) -> Self {
        match self {
            CompressionLevel::AdaptiveFast => CompressionLevel::High,
            CompressionLevel::AdaptiveFastDelta => CompressionLevel::HighDelta,
            other => other,
        }
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CompressionLevel::from_u8(value)
            .ok_or_else(|| format!("compression level must be 0-6, got {}", value))
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> u8 {
        level.as_u8()
    }
}

/// Everything needed to open a session with a device
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConnectOptions {
    /// Device host name or IP address
    pub host: String,
    pub port: u16,
    pub input_port: u16,
    /// Link MTU in bytes, 0 for the default payload size
    pub mtu: u16,
    pub compression: CompressionLevel,
    /// PCM sample rate; only 22050, 44100 and 48000 enable audio
    pub sound_rate: u32,
    pub sound_channels: u8,
    pub pixel_format: PixelFormat,
    pub family: OutputFamily,
    /// Source framebuffer is progressive even for interlaced output
    pub progressive_buffer: bool,
    /// Allow delta fields at even compression levels
    pub delta_frames: bool,
    /// Submit streams in batches where the platform supports it
    pub batched_send: bool,
    /// Vsync lead margin in nanoseconds
    pub margin_ns: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            input_port: DEFAULT_INPUT_PORT,
            mtu: 0,
            compression: CompressionLevel::default(),
            sound_rate: 48000,
            sound_channels: 2,
            pixel_format: PixelFormat::default(),
            family: OutputFamily::default(),
            progressive_buffer: false,
            delta_frames: true,
            batched_send: false,
            margin_ns: DEFAULT_MARGIN_NS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>) -> Self {
        ConnectOptions {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Bytes carried by one bulk datagram
    pub fn mtu_payload(&self) -> usize {
        match self.mtu as usize {
            0 => DEFAULT_MTU_PAYLOAD,
            mtu => mtu.saturating_sub(IP_UDP_OVERHEAD).max(1),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Resolve the control and input addresses of the device
    pub fn resolve(&self) -> Result<(SocketAddr, SocketAddr), ConnectError> {
        let control = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectError::InvalidAddress(format!("{}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| ConnectError::InvalidAddress(self.host.clone()))?;

        let mut input = control;
        input.set_port(self.input_port);
        Ok((control, input))
    }
}
