//! Frame pacing against the device raster
//!
//! The scheduler picks the scan line at which each field should be
//! presented and paces the caller so that local frame production keeps
//! step with the remote raster. Echoes from the device tell where the last
//! field was actually presented; half of the observed line difference is
//! folded into the current wait on every fresh echo.

use groovy_io::Clock;
use groovy_protocol::{DeviceStatus, VideoMode};

/// Frames that use the startup vsync line
pub const STARTUP_FRAMES: u32 = 10;

/// Wake-ups later than this are logged
pub const LATE_WAKE_NS: u64 = 1_000_000;

/// Source of raster position echoes
pub trait RasterFeedback {
    /// Drain pending echoes; true if a newer status was stored
    fn refresh(&mut self) -> bool;

    /// Latest accepted status
    fn status(&self) -> DeviceStatus;
}

/// Outcome of one [`FrameScheduler::wait_sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub frame: u32,
    /// Time spent producing the frame since the previous sync
    pub emulation_ns: u64,
    /// Wait planned before any raster correction
    pub planned_ns: u64,
    /// Wait after raster corrections
    pub sleep_ns: u64,
    /// Time actually spent waiting
    pub elapsed_ns: u64,
    /// Sum of raster corrections applied
    pub correction_ns: i64,
    /// Number of fresh echoes seen while waiting
    pub echoes: u32,
}

impl SyncReport {
    pub fn is_late(&self) -> bool {
        self.elapsed_ns > self.sleep_ns + LATE_WAKE_NS
    }
}

/// Per-session pacing state
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    line_time_ns: u64,
    frame_time_ns: u64,
    v_total: u16,
    field_shift: u32,
    frame: u32,
    tick_sync: u64,
    emulation_ns: u64,
    stream_ns: u64,
    ping_ns: u64,
    margin_ns: u64,
}

impl FrameScheduler {
    pub fn new(margin_ns: u64) -> Self {
        FrameScheduler {
            margin_ns,
            ..Default::default()
        }
    }

    /// Take the timing of a new mode
    pub fn set_mode(&mut self, mode: &VideoMode) {
        self.line_time_ns = mode.line_time_ns();
        self.frame_time_ns = mode.field_time_ns();
        self.v_total = mode.v_total;
        self.field_shift = mode.field_shift();
        tracing::debug!(
            "line time {} ns, field time {} ns",
            self.line_time_ns,
            self.frame_time_ns
        );
    }

    /// Start the sync timeline at `now_ns`
    pub fn start(&mut self, now_ns: u64) {
        self.tick_sync = now_ns;
    }

    pub fn set_ping(&mut self, ping_ns: u64) {
        self.ping_ns = ping_ns;
    }

    pub fn ping_ns(&self) -> u64 {
        self.ping_ns
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn frame_time_ns(&self) -> u64 {
        self.frame_time_ns
    }

    pub fn line_time_ns(&self) -> u64 {
        self.line_time_ns
    }

    /// Emulation time measured by the last sync
    pub fn emulation_ns(&self) -> u64 {
        self.emulation_ns
    }

    /// Duration of the last body stream
    pub fn stream_ns(&self) -> u64 {
        self.stream_ns
    }

    pub fn record_stream(&mut self, stream_ns: u64) {
        self.stream_ns = stream_ns;
    }

    /// Advance to the next frame number
    ///
    /// The counter never falls behind the device: if the device reports
    /// frame `n` or later, the next frame is `n + 1`.
    pub fn next_frame(&mut self, device_frame: u32) -> u32 {
        self.frame = self.frame.wrapping_add(1);
        if device_frame >= self.frame {
            self.frame = device_frame.wrapping_add(1);
        }
        self.frame
    }

    /// Line at which the current frame should be presented
    pub fn vsync_target(&self) -> u16 {
        if self.frame <= STARTUP_FRAMES {
            return self.v_total / 2;
        }

        let budget = self.ping_ns + self.margin_ns + self.emulation_ns;
        if budget >= self.frame_time_ns || self.frame_time_ns == 0 {
            return 1;
        }

        let pending = budget as i64 - self.stream_ns as i64;
        if pending <= 0 {
            return 1;
        }

        let total = self.v_total as f64;
        let lead = (total * pending as f64 / self.frame_time_ns as f64).round();
        (total - lead).clamp(1.0, total.max(1.0)) as u16
    }

    /// Raster drift observed from a fresh echo, in nanoseconds
    ///
    /// Polls only while the device has not echoed the current frame, and
    /// returns 0 unless the poll produced a newer echo. The line difference
    /// is halved so corrections converge instead of overshooting.
    pub fn diff_time_raster<F: RasterFeedback>(&self, feedback: &mut F) -> i64 {
        let before = feedback.status().frame_echo;
        if self.frame != before {
            feedback.refresh();
        }

        let status = feedback.status();
        if status.frame_echo == before {
            return 0;
        }

        let v_total = self.v_total as i64;
        let echoed = ((status.frame_echo as i64 - 1) * v_total + status.vcount_echo as i64)
            >> self.field_shift;
        let current = (status.frame as i64 * v_total + status.vcount as i64) >> self.field_shift;
        let lines = (echoed - current) / 2;

        tracing::trace!(
            frame_echo = status.frame_echo,
            vcount_echo = status.vcount_echo,
            frame = status.frame,
            vcount = status.vcount,
            lines,
            "raster echo"
        );
        self.line_time_ns as i64 * lines
    }

    /// Wait until the device is ready for the next frame
    pub fn wait_sync<C: Clock, F: RasterFeedback>(
        &mut self,
        clock: &C,
        feedback: &mut F,
    ) -> SyncReport {
        self.emulation_ns = clock.elapsed_since(self.tick_sync);
        let planned = self.frame_time_ns.saturating_sub(self.emulation_ns) as i64;

        let start = clock.now_ns();
        let mut sleep = planned;
        let mut correction = 0i64;
        let mut echoes = 0;
        let mut end;
        loop {
            let diff = self.diff_time_raster(feedback);
            if diff != 0 {
                echoes += 1;
                correction += diff;
            }
            sleep = if diff < 0 && -diff > sleep {
                0
            } else {
                sleep + diff
            };

            end = clock.now_ns();
            if end.saturating_sub(start) as i64 > sleep {
                break;
            }
            std::hint::spin_loop();
        }
        self.tick_sync = end;

        let report = SyncReport {
            frame: self.frame,
            emulation_ns: self.emulation_ns,
            planned_ns: planned as u64,
            sleep_ns: sleep as u64,
            elapsed_ns: end.saturating_sub(start),
            correction_ns: correction,
            echoes,
        };

        if report.is_late() {
            tracing::debug!(
                "frame {} woke late: sleep {} ns, real {} ns (frame time {}, stream {}, emulation {})",
                self.frame,
                report.sleep_ns,
                report.elapsed_ns,
                self.frame_time_ns,
                self.stream_ns,
                self.emulation_ns
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovy_io::ManualClock;
    use groovy_protocol::{compute_mode, ModeRequest, OutputFamily};

    /// Device whose echoes show a fixed raster difference
    struct SkewedDevice {
        status: DeviceStatus,
        /// Echoed minus current position, in lines
        skew_lines: u16,
        pending: Option<u32>,
    }

    impl SkewedDevice {
        fn new(skew_lines: u16) -> Self {
            SkewedDevice {
                status: DeviceStatus::default(),
                skew_lines,
                pending: None,
            }
        }

        fn present(&mut self, frame: u32) {
            self.pending = Some(frame);
        }
    }

    impl RasterFeedback for SkewedDevice {
        fn refresh(&mut self) -> bool {
            let Some(frame) = self.pending.take() else {
                return false;
            };
            self.status.frame_echo = frame;
            self.status.vcount_echo = 10 + self.skew_lines;
            self.status.frame = frame - 1;
            self.status.vcount = 10;
            true
        }

        fn status(&self) -> DeviceStatus {
            self.status
        }
    }

    fn progressive_240p() -> VideoMode {
        compute_mode(&ModeRequest {
            width: 320,
            height: 240,
            refresh_hz: 60.0,
            family: OutputFamily::Auto,
            progressive_buffer: false,
        })
        .mode
    }

    fn scheduler_for(mode: &VideoMode, clock: &ManualClock) -> FrameScheduler {
        let mut scheduler = FrameScheduler::new(0);
        scheduler.set_mode(mode);
        scheduler.start(clock.now_ns());
        scheduler
    }

    #[test]
    fn test_startup_vsync() {
        let mut scheduler = FrameScheduler::new(1_500_000);
        scheduler.set_mode(&progressive_240p());
        for _ in 0..STARTUP_FRAMES {
            scheduler.next_frame(0);
            assert_eq!(scheduler.vsync_target(), 131);
        }
    }

    #[test]
    fn test_vsync_after_startup() {
        let mut scheduler = FrameScheduler::new(1_500_000);
        scheduler.set_mode(&progressive_240p());
        scheduler.frame = 11;

        // pending = 1.5 ms of a ~16.7 ms field
        let expected = 262.0 - (262.0 * 1_500_000.0 / scheduler.frame_time_ns() as f64).round();
        assert_eq!(scheduler.vsync_target(), expected as u16);

        // over budget presents as early as possible
        scheduler.emulation_ns = scheduler.frame_time_ns();
        assert_eq!(scheduler.vsync_target(), 1);

        // a stream longer than the budget does not underflow
        scheduler.emulation_ns = 0;
        scheduler.stream_ns = 10_000_000;
        assert_eq!(scheduler.vsync_target(), 1);
    }

    #[test]
    fn test_frame_never_behind_device() {
        let mut scheduler = FrameScheduler::new(0);
        assert_eq!(scheduler.next_frame(0), 1);
        assert_eq!(scheduler.next_frame(0), 2);
        assert_eq!(scheduler.next_frame(40), 41);
        assert_eq!(scheduler.next_frame(3), 42);
    }

    #[test]
    fn test_wait_without_echo_sleeps_budget() {
        let clock = ManualClock::with_step(1_000);
        let mut scheduler = scheduler_for(&progressive_240p(), &clock);
        scheduler.next_frame(0);

        clock.advance(4_000_000);
        let mut device = SkewedDevice::new(0);
        let report = scheduler.wait_sync(&clock, &mut device);

        assert_eq!(report.echoes, 0);
        assert!(report.emulation_ns >= 4_000_000);
        assert_eq!(report.sleep_ns, report.planned_ns);
        assert!(report.elapsed_ns > report.sleep_ns);
        assert!(!report.is_late());
    }

    #[test]
    fn test_over_budget_does_not_sleep() {
        let clock = ManualClock::with_step(1_000);
        let mode = progressive_240p();
        let mut scheduler = scheduler_for(&mode, &clock);
        scheduler.next_frame(0);

        clock.advance(mode.field_time_ns() * 2);
        let report = scheduler.wait_sync(&clock, &mut SkewedDevice::new(0));
        assert_eq!(report.planned_ns, 0);
        assert!(report.elapsed_ns <= 1_000);
    }

    #[test]
    fn test_diff_only_on_fresh_echo() {
        let mode = progressive_240p();
        let mut scheduler = FrameScheduler::new(0);
        scheduler.set_mode(&mode);
        let mut device = SkewedDevice::new(6);

        let frame = scheduler.next_frame(0);
        device.present(frame);
        assert_eq!(
            scheduler.diff_time_raster(&mut device),
            3 * mode.line_time_ns() as i64
        );
        // echo already seen
        assert_eq!(scheduler.diff_time_raster(&mut device), 0);
    }

    #[test]
    fn test_constant_lag_correction_is_bounded() {
        let clock = ManualClock::with_step(1_000);
        let mode = progressive_240p();
        let mut scheduler = scheduler_for(&mode, &clock);
        let mut device = SkewedDevice::new(2);
        let line = mode.line_time_ns() as i64;

        for _ in 0..20 {
            let frame = scheduler.next_frame(device.status.frame);
            device.present(frame);
            let report = scheduler.wait_sync(&clock, &mut device);

            // half of the two-line lag, once per frame
            assert_eq!(report.echoes, 1);
            assert_eq!(report.correction_ns, line);
            assert_eq!(report.sleep_ns, report.planned_ns + line as u64);
        }
    }

    #[test]
    fn test_drift_converges() {
        let clock = ManualClock::with_step(1_000);
        let mode = progressive_240p();
        let mut scheduler = scheduler_for(&mode, &clock);
        let mut device = SkewedDevice::new(40);
        let line = mode.line_time_ns() as i64;

        let mut skews = vec![device.skew_lines];
        for _ in 0..12 {
            let frame = scheduler.next_frame(device.status.frame);
            device.present(frame);
            let report = scheduler.wait_sync(&clock, &mut device);

            // waiting longer moves the device phase by the applied lines
            let applied = (report.correction_ns / line) as u16;
            device.skew_lines -= applied;
            skews.push(device.skew_lines);
        }

        assert!(skews.windows(2).all(|w| w[1] <= w[0]));
        assert!(*skews.last().unwrap() <= 1);
    }
}
