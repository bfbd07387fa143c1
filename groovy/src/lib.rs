//! Groovy - low latency video streaming to MiSTer FPGA displays
//!
//! Streams emulator frames, audio and mode changes to a device running the
//! Groovy core over UDP, paces frame production against the remote raster
//! and collects the input the device sends back.
//!
//! ```no_run
//! use groovy::{ConnectOptions, Device};
//!
//! let mut device = Device::connect(ConnectOptions::new("192.168.1.50"))?;
//! let timing = device.set_resolution(320, 240, 60.0);
//! let frame = vec![0u8; 320 * 240 * 3];
//! for _ in 0..600 {
//!     let field = device.next_field();
//!     device.present(&frame, field, 0);
//!     device.poll_inputs();
//! }
//! # let _ = timing;
//! # Ok::<(), groovy::ConnectError>(())
//! ```

pub use groovy_io as io;
pub use groovy_protocol as protocol;

pub mod audio;
pub mod compress;
pub mod congestion;
pub mod device;
pub mod encoder;
pub mod error;
pub mod options;
pub mod scheduler;
pub mod stats;

pub use audio::{AudioBuffer, MAX_AUDIO_SIZE};
pub use congestion::{CongestionGate, BURST_GAP_NS, BURST_THRESHOLD};
pub use device::Device;
pub use encoder::{EncodedField, FrameEncoder, PreparedField, MAX_FIELD_SIZE};
pub use error::ConnectError;
pub use options::{
    CompressionLevel, Compressor, ConnectOptions, DEFAULT_INPUT_PORT, DEFAULT_MTU_PAYLOAD,
    DEFAULT_PORT,
};
pub use scheduler::{FrameScheduler, RasterFeedback, SyncReport};
pub use stats::StreamStats;

// Re-export commonly used types
pub use protocol::{
    InputState, ModeRequest, ModeTiming, OutputFamily, PayloadKind, PixelFormat, VideoMode,
};
