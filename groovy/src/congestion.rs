//! Burst pacing between large streams
//!
//! After a stream of at least [`BURST_THRESHOLD`] bytes the next stream is
//! held back until [`BURST_GAP_NS`] have passed since the previous one
//! finished, giving the device time to drain its receive buffer.

use groovy_io::Clock;

/// Stream size that arms the gate
pub const BURST_THRESHOLD: usize = 500_000;

/// Minimum gap after a large stream
pub const BURST_GAP_NS: u64 = 110_000;

/// Congestion gate state
#[derive(Debug, Clone, Default)]
pub struct CongestionGate {
    last_len: usize,
    last_end_ns: Option<u64>,
    waits: u64,
}

impl CongestionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next stream has to wait
    pub fn armed(&self) -> bool {
        self.last_len >= BURST_THRESHOLD && self.last_end_ns.is_some()
    }

    /// Spin until the next stream may start
    ///
    /// Returns the nanoseconds spent waiting.
    pub fn wait<C: Clock>(&mut self, clock: &C) -> u64 {
        let Some(end) = self.last_end_ns.filter(|_| self.last_len >= BURST_THRESHOLD) else {
            return 0;
        };

        let start = clock.now_ns();
        let mut elapsed = start.saturating_sub(end);
        if elapsed >= BURST_GAP_NS {
            return 0;
        }
        while elapsed < BURST_GAP_NS {
            std::hint::spin_loop();
            elapsed = clock.elapsed_since(end);
        }

        self.waits += 1;
        let waited = (end + elapsed).saturating_sub(start);
        tracing::trace!("congestion gate held stream for {} ns", waited);
        waited
    }

    /// Note a finished stream
    pub fn record(&mut self, len: usize, end_ns: u64) {
        self.last_len = len;
        self.last_end_ns = Some(end_ns);
    }

    /// Number of streams that were held back
    pub fn waits(&self) -> u64 {
        self.waits
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
