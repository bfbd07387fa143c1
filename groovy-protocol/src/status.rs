//! Device status echo
//!
//! The device answers every blit (and the INIT handshake) with a 13-byte
//! datagram describing where its raster was when the last field was
//! presented and where it is now. Echoes travel over UDP and may arrive
//! duplicated or out of order, so [`StatusTracker`] only accepts an echo
//! whose frame number is strictly newer than the stored one.

use crate::command::CodecError;
use bytes::Buf;

/// Size of a status echo in bytes
pub const STATUS_SIZE: usize = 13;

/// Status bits carried in the last byte of the echo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags {
    /// Video RAM has room for the next field (bit 0)
    pub vram_ready: bool,
    /// Video RAM reached end of frame (bit 1)
    pub vram_end_frame: bool,
    /// Video RAM is synced with the raster (bit 2)
    pub vram_synced: bool,
    /// Output skipped a frame (bit 3)
    pub vga_frameskip: bool,
    /// Raster is inside vertical blanking (bit 4)
    pub vga_vblank: bool,
    /// Current field parity of the output (bit 5)
    pub field_parity: bool,
    /// Device accepts audio (bit 6)
    pub audio_enabled: bool,
    /// Video RAM queue is not empty (bit 7)
    pub vram_queue: bool,
}

impl StatusFlags {
    /// Parse from the status byte
    pub fn from_bits(bits: u8) -> Self {
        StatusFlags {
            vram_ready: bits & (1 << 0) != 0,
            vram_end_frame: bits & (1 << 1) != 0,
            vram_synced: bits & (1 << 2) != 0,
            vga_frameskip: bits & (1 << 3) != 0,
            vga_vblank: bits & (1 << 4) != 0,
            field_parity: bits & (1 << 5) != 0,
            audio_enabled: bits & (1 << 6) != 0,
            vram_queue: bits & (1 << 7) != 0,
        }
    }

    /// Convert to the status byte
    pub fn to_bits(&self) -> u8 {
        let mut bits = 0u8;
        if self.vram_ready {
            bits |= 1 << 0;
        }
        if self.vram_end_frame {
            bits |= 1 << 1;
        }
        if self.vram_synced {
            bits |= 1 << 2;
        }
        if self.vga_frameskip {
            bits |= 1 << 3;
        }
        if self.vga_vblank {
            bits |= 1 << 4;
        }
        if self.field_parity {
            bits |= 1 << 5;
        }
        if self.audio_enabled {
            bits |= 1 << 6;
        }
        if self.vram_queue {
            bits |= 1 << 7;
        }
        bits
    }
}

/// Raster position reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    /// Frame number of the last field the device presented
    pub frame_echo: u32,
    /// Scan line at which that field was presented
    pub vcount_echo: u16,
    /// Device frame counter at the time of the echo
    pub frame: u32,
    /// Device scan line at the time of the echo
    pub vcount: u16,
    pub flags: StatusFlags,
}

impl DeviceStatus {
    /// Parse a 13-byte echo
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != STATUS_SIZE {
            return Err(CodecError::UnexpectedLength(bytes.len()));
        }

        let mut buf = bytes;
        Ok(DeviceStatus {
            frame_echo: buf.get_u32_le(),
            vcount_echo: buf.get_u16_le(),
            frame: buf.get_u32_le(),
            vcount: buf.get_u16_le(),
            flags: StatusFlags::from_bits(buf.get_u8()),
        })
    }

    /// Serialize the echo, as the device sends it
    pub fn to_bytes(&self) -> [u8; STATUS_SIZE] {
        let mut out = [0u8; STATUS_SIZE];
        out[0..4].copy_from_slice(&self.frame_echo.to_le_bytes());
        out[4..6].copy_from_slice(&self.vcount_echo.to_le_bytes());
        out[6..10].copy_from_slice(&self.frame.to_le_bytes());
        out[10..12].copy_from_slice(&self.vcount.to_le_bytes());
        out[12] = self.flags.to_bits();
        out
    }
}

/// Latest accepted device status
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    current: DeviceStatus,
    accepted: u64,
    discarded: u64,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a freshly received echo
    ///
    /// Returns true if the echo was newer than the stored status and
    /// replaced it. Older or equal frame numbers are discarded.
    pub fn offer(&mut self, status: DeviceStatus) -> bool {
        if status.frame_echo > self.current.frame_echo {
            tracing::trace!(
                frame_echo = status.frame_echo,
                vcount_echo = status.vcount_echo,
                frame = status.frame,
                vcount = status.vcount,
                bits = status.flags.to_bits(),
                "status echo"
            );
            self.current = status;
            self.accepted += 1;
            true
        } else {
            self.discarded += 1;
            false
        }
    }

    /// Parse and offer a raw 13-byte echo
    pub fn offer_bytes(&mut self, bytes: &[u8]) -> Result<bool, CodecError> {
        Ok(self.offer(DeviceStatus::from_bytes(bytes)?))
    }

    pub fn current(&self) -> &DeviceStatus {
        &self.current
    }

    /// Number of echoes that replaced the stored status
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Number of stale or duplicate echoes
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Forget everything, e.g. on reconnect
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(frame_echo: u32) -> DeviceStatus {
        DeviceStatus {
            frame_echo,
            vcount_echo: 10,
            frame: frame_echo,
            vcount: 20,
            flags: StatusFlags::default(),
        }
    }

    #[test]
    fn test_flags_bits() {
        let flags = StatusFlags::from_bits(0b0110_0001);
        assert!(flags.vram_ready);
        assert!(!flags.vram_end_frame);
        assert!(flags.field_parity);
        assert!(flags.audio_enabled);
        assert!(!flags.vram_queue);
        assert_eq!(flags.to_bits(), 0b0110_0001);
    }

    #[test]
    fn test_status_layout() {
        let bytes = [
            5, 0, 0, 0, // frame_echo
            100, 0, // vcount_echo
            6, 0, 0, 0, // frame
            0x2C, 0x01, // vcount = 300
            0b0100_0000,
        ];
        let status = DeviceStatus::from_bytes(&bytes).unwrap();
        assert_eq!(status.frame_echo, 5);
        assert_eq!(status.vcount_echo, 100);
        assert_eq!(status.frame, 6);
        assert_eq!(status.vcount, 300);
        assert!(status.flags.audio_enabled);
        assert_eq!(status.to_bytes(), bytes);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(
            DeviceStatus::from_bytes(&[0u8; 12]),
            Err(CodecError::UnexpectedLength(12))
        );
    }

    #[test]
    fn test_tracker_monotonic() {
        let mut tracker = StatusTracker::new();
        let mut seen = Vec::new();
        for frame in [5, 3, 6, 6, 4] {
            tracker.offer(echo(frame));
            seen.push(tracker.current().frame_echo);
        }
        assert_eq!(seen, vec![5, 5, 6, 6, 6]);
        assert_eq!(tracker.accepted(), 2);
        assert_eq!(tracker.discarded(), 3);
    }

    #[test]
    fn test_tracker_zero_frame_ignored() {
        let mut tracker = StatusTracker::new();
        assert!(!tracker.offer(echo(0)));
        assert!(tracker.offer(echo(1)));
    }
}
