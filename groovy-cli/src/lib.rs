//! Groovy CLI Library
//!
//! Shared functionality for the Groovy command-line tools.

pub mod config;
pub mod pattern;
pub mod stats;

pub use config::{Config, ConfigError, PatternConfig};
pub use pattern::{SquareWave, TestPattern};
pub use stats::{compact_stats, display_session_stats, format_bandwidth, format_bytes, format_duration, format_nanos};
