//! Input channel datagrams
//!
//! The device streams controller and keyboard/mouse state on a separate UDP
//! port. Both snapshot kinds share the socket and are told apart by length:
//!
//! | Length | Content                                   |
//! |--------|-------------------------------------------|
//! | 9      | joystick, digital only                    |
//! | 17     | joystick with 8 analog axis bytes         |
//! | 37     | PS2 keyboard bitmap                       |
//! | 41     | PS2 keyboard bitmap and mouse             |
//!
//! Every datagram starts with `frame: u32` and `order: u8`. A snapshot only
//! replaces the stored one when its `(frame, order)` pair is strictly greater.

use crate::command::CodecError;
use bytes::Buf;

pub const JOY_DIGITAL_SIZE: usize = 9;
pub const JOY_ANALOG_SIZE: usize = 17;
pub const PS2_KEYBOARD_SIZE: usize = 37;
pub const PS2_MOUSE_SIZE: usize = 41;

/// Largest input datagram
pub const MAX_INPUT_SIZE: usize = PS2_MOUSE_SIZE;

/// Position of a snapshot in the device's input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InputOrder {
    pub frame: u32,
    pub order: u8,
}

impl InputOrder {
    pub fn new(frame: u32, order: u8) -> Self {
        InputOrder { frame, order }
    }
}

/// Digital joystick buttons, as bit masks of the 16-bit state word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum JoyButton {
    Right = 1 << 0,
    Left = 1 << 1,
    Down = 1 << 2,
    Up = 1 << 3,
    B1 = 1 << 4,
    B2 = 1 << 5,
    B3 = 1 << 6,
    B4 = 1 << 7,
    B5 = 1 << 8,
    B6 = 1 << 9,
    B7 = 1 << 10,
    B8 = 1 << 11,
    B9 = 1 << 12,
    B10 = 1 << 13,
}

impl JoyButton {
    pub const ALL: [JoyButton; 14] = [
        JoyButton::Up,
        JoyButton::Right,
        JoyButton::Down,
        JoyButton::Left,
        JoyButton::B1,
        JoyButton::B2,
        JoyButton::B3,
        JoyButton::B4,
        JoyButton::B5,
        JoyButton::B6,
        JoyButton::B7,
        JoyButton::B8,
        JoyButton::B9,
        JoyButton::B10,
    ];

    pub fn mask(self) -> u16 {
        self as u16
    }
}

/// Analog stick axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
}

/// State of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pad {
    pub buttons: u16,
    /// LX, LY, RX, RY as signed bytes
    pub axes: [i8; 4],
}

impl Pad {
    pub fn is_pressed(&self, button: JoyButton) -> bool {
        self.buttons & button.mask() != 0
    }

    pub fn axis(&self, axis: Axis) -> i8 {
        self.axes[axis as usize]
    }

    /// Axis value scaled to -1.0..=1.0
    pub fn axis_normalized(&self, axis: Axis) -> f64 {
        (self.axis(axis) as f64 / 127.0).clamp(-1.0, 1.0)
    }
}

/// Joystick snapshot for both controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoySnapshot {
    pub order: InputOrder,
    pub pads: [Pad; 2],
    /// Whether the datagram carried analog axes
    pub analog: bool,
}

impl JoySnapshot {
    /// Parse a 9- or 17-byte datagram
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != JOY_DIGITAL_SIZE && bytes.len() != JOY_ANALOG_SIZE {
            return Err(CodecError::UnexpectedLength(bytes.len()));
        }

        let mut buf = bytes;
        let order = InputOrder::new(buf.get_u32_le(), buf.get_u8());
        let mut pads = [Pad::default(); 2];
        pads[0].buttons = buf.get_u16_le();
        pads[1].buttons = buf.get_u16_le();

        let analog = bytes.len() == JOY_ANALOG_SIZE;
        if analog {
            for pad in pads.iter_mut() {
                for axis in pad.axes.iter_mut() {
                    *axis = buf.get_i8();
                }
            }
        }

        Ok(JoySnapshot {
            order,
            pads,
            analog,
        })
    }
}

/// PS2 mouse state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mouse {
    /// PS2 status byte: bit0 left, bit1 right, bit2 middle, bits 4-7 sign/overflow
    pub buttons: u8,
    pub dx: u8,
    pub dy: u8,
    pub dz: u8,
}

impl Mouse {
    pub fn left(&self) -> bool {
        self.buttons & 0x01 != 0
    }

    pub fn right(&self) -> bool {
        self.buttons & 0x02 != 0
    }

    pub fn middle(&self) -> bool {
        self.buttons & 0x04 != 0
    }
}

/// Keyboard and mouse snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ps2Snapshot {
    pub order: InputOrder,
    /// One bit per PS2 scan code
    pub keys: [u8; 32],
    /// Present only in 41-byte datagrams
    pub mouse: Option<Mouse>,
}

impl Ps2Snapshot {
    /// Parse a 37- or 41-byte datagram
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != PS2_KEYBOARD_SIZE && bytes.len() != PS2_MOUSE_SIZE {
            return Err(CodecError::UnexpectedLength(bytes.len()));
        }

        let mut buf = bytes;
        let order = InputOrder::new(buf.get_u32_le(), buf.get_u8());
        let mut keys = [0u8; 32];
        buf.copy_to_slice(&mut keys);

        let mouse = if bytes.len() == PS2_MOUSE_SIZE {
            Some(Mouse {
                buttons: buf.get_u8(),
                dx: buf.get_u8(),
                dy: buf.get_u8(),
                dz: buf.get_u8(),
            })
        } else {
            None
        };

        Ok(Ps2Snapshot { order, keys, mouse })
    }

    pub fn is_key_down(&self, scan_code: u8) -> bool {
        let code = scan_code as usize;
        (self.keys[code / 8] >> (code % 8)) & 1 != 0
    }

    /// Scan codes currently held
    pub fn keys_down(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&code| self.is_key_down(code))
    }
}

/// A parsed input datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPacket {
    Joystick(JoySnapshot),
    Ps2(Ps2Snapshot),
}

impl InputPacket {
    /// Classify and parse a datagram by its length
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        match bytes.len() {
            JOY_DIGITAL_SIZE | JOY_ANALOG_SIZE => {
                Ok(InputPacket::Joystick(JoySnapshot::from_bytes(bytes)?))
            }
            PS2_KEYBOARD_SIZE | PS2_MOUSE_SIZE => Ok(InputPacket::Ps2(Ps2Snapshot::from_bytes(bytes)?)),
            other => Err(CodecError::UnexpectedLength(other)),
        }
    }
}

/// Latest accepted input state
///
/// Joystick and PS2 snapshots are guarded independently.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    joy: JoySnapshot,
    ps2: Ps2Snapshot,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a datagram, returning true if it replaced the stored snapshot
    pub fn apply(&mut self, packet: InputPacket) -> bool {
        match packet {
            InputPacket::Joystick(snapshot) => {
                if snapshot.order > self.joy.order {
                    tracing::trace!(
                        frame = snapshot.order.frame,
                        order = snapshot.order.order,
                        joy1 = snapshot.pads[0].buttons,
                        joy2 = snapshot.pads[1].buttons,
                        "joystick"
                    );
                    self.joy = snapshot;
                    true
                } else {
                    false
                }
            }
            InputPacket::Ps2(snapshot) => {
                if snapshot.order > self.ps2.order {
                    tracing::trace!(
                        frame = snapshot.order.frame,
                        order = snapshot.order.order,
                        mouse = snapshot.mouse.is_some(),
                        "ps2"
                    );
                    self.ps2 = snapshot;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Parse and apply a raw datagram; unknown lengths are ignored
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> bool {
        match InputPacket::from_bytes(bytes) {
            Ok(packet) => self.apply(packet),
            Err(_) => false,
        }
    }

    pub fn joystick(&self) -> &JoySnapshot {
        &self.joy
    }

    pub fn pad(&self, index: usize) -> &Pad {
        &self.joy.pads[index.min(1)]
    }

    pub fn ps2(&self) -> &Ps2Snapshot {
        &self.ps2
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joy_bytes(frame: u32, order: u8, joy1: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(JOY_DIGITAL_SIZE);
        out.extend_from_slice(&frame.to_le_bytes());
        out.push(order);
        out.extend_from_slice(&joy1.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_input_order() {
        assert!(InputOrder::new(10, 2) > InputOrder::new(10, 1));
        assert!(InputOrder::new(11, 0) > InputOrder::new(10, 255));
        assert!(InputOrder::new(10, 0) == InputOrder::new(10, 0));
    }

    #[test]
    fn test_joystick_analog_parse() {
        let mut bytes = joy_bytes(3, 1, JoyButton::Up.mask() | JoyButton::B1.mask());
        bytes.extend_from_slice(&[0x7F, 0x81, 0, 1, 2, 3, 4, 5]);

        let snapshot = JoySnapshot::from_bytes(&bytes).unwrap();
        assert!(snapshot.analog);
        assert!(snapshot.pads[0].is_pressed(JoyButton::Up));
        assert!(snapshot.pads[0].is_pressed(JoyButton::B1));
        assert!(!snapshot.pads[0].is_pressed(JoyButton::Down));
        assert_eq!(snapshot.pads[0].axis(Axis::LeftX), 127);
        assert_eq!(snapshot.pads[0].axis(Axis::LeftY), -127);
        assert_eq!(snapshot.pads[1].axis(Axis::RightY), 5);
        assert_eq!(snapshot.pads[0].axis_normalized(Axis::LeftX), 1.0);
        assert_eq!(snapshot.pads[0].axis_normalized(Axis::LeftY), -1.0);
    }

    #[test]
    fn test_ps2_parse() {
        let mut bytes = vec![0u8; PS2_MOUSE_SIZE];
        bytes[0] = 9;
        bytes[5 + 0x1C / 8] = 1 << (0x1C % 8);
        bytes[37] = 0x03;
        bytes[38] = 4;

        let snapshot = Ps2Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.order, InputOrder::new(9, 0));
        assert!(snapshot.is_key_down(0x1C));
        assert!(!snapshot.is_key_down(0x1D));
        assert_eq!(snapshot.keys_down().collect::<Vec<_>>(), vec![0x1C]);

        let mouse = snapshot.mouse.unwrap();
        assert!(mouse.left() && mouse.right() && !mouse.middle());
        assert_eq!(mouse.dx, 4);
    }

    #[test]
    fn test_unknown_length_ignored() {
        let mut state = InputState::new();
        assert!(!state.apply_bytes(&[0u8; 12]));
        assert_eq!(state.joystick().order, InputOrder::default());
    }

    #[test]
    fn test_joystick_ordering() {
        let mut state = InputState::new();
        let mut applied = Vec::new();
        for (frame, order) in [(10, 0), (10, 2), (10, 1), (11, 0)] {
            if state.apply_bytes(&joy_bytes(frame, order, order as u16)) {
                applied.push((frame, order));
            }
        }
        assert_eq!(applied, vec![(10, 0), (10, 2), (11, 0)]);
    }

    #[test]
    fn test_channels_independent() {
        let mut state = InputState::new();
        assert!(state.apply_bytes(&joy_bytes(50, 0, 1)));

        let mut ps2 = vec![0u8; PS2_KEYBOARD_SIZE];
        ps2[0] = 2;
        assert!(state.apply_bytes(&ps2));
        assert_eq!(state.ps2().order.frame, 2);
        assert_eq!(state.joystick().order.frame, 50);
    }
}
