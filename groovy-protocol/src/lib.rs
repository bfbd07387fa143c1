//! Groovy Protocol Core Implementation
//!
//! Wire formats spoken between a host and a MiSTer display device running
//! the Groovy core: control commands, blit headers, status echoes, input
//! snapshots, and the mode negotiation tables.

pub mod command;
pub mod frame;
pub mod input;
pub mod mode;
pub mod status;

pub use command::{sound_rate_code, CodecError, Command, CommandCode, InitParams, PixelFormat};
pub use frame::{FrameHeader, PayloadKind};
pub use input::{
    Axis, InputOrder, InputPacket, InputState, JoyButton, JoySnapshot, Mouse, Pad, Ps2Snapshot,
};
pub use mode::{compute_mode, Interlace, ModeRequest, ModeTiming, OutputFamily, VideoMode};
pub use status::{DeviceStatus, StatusFlags, StatusTracker, STATUS_SIZE};
