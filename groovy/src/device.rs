//! Streaming session with one display device
//!
//! [`Device`] owns the transport, the field encoder, the scheduler and the
//! latest device state. Everything runs on the calling thread: a typical
//! frame is [`Device::blit`] followed by [`Device::wait_sync`], or
//! [`Device::present`] for both.
//!
//! Only connecting can fail. Once connected, lost datagrams and stale
//! replies are tolerated silently, and every call made while disconnected
//! is a no-op.

use crate::audio::AudioBuffer;
use crate::congestion::CongestionGate;
use crate::encoder::FrameEncoder;
use crate::error::ConnectError;
use crate::options::{CompressionLevel, ConnectOptions};
use crate::scheduler::{FrameScheduler, RasterFeedback, SyncReport};
use crate::stats::StreamStats;
use groovy_io::{duration_ns, Clock, MonotonicClock, SocketTransport, Transport};
use groovy_protocol::{
    compute_mode, sound_rate_code, Command, DeviceStatus, FrameHeader, InitParams, InputState,
    ModeRequest, ModeTiming, StatusTracker, STATUS_SIZE,
};

/// Receive buffer for replies and input datagrams
const RECV_BUFFER_SIZE: usize = 256;

/// Size of the version reply
const VERSION_SIZE: usize = 1;

/// Session with one device
pub struct Device<T: Transport = SocketTransport, C: Clock = MonotonicClock> {
    transport: T,
    clock: C,
    options: ConnectOptions,
    mtu: usize,
    connected: bool,
    status: StatusTracker,
    inputs: InputState,
    encoder: FrameEncoder,
    scheduler: FrameScheduler,
    gate: CongestionGate,
    audio: AudioBuffer,
    timing: Option<ModeTiming>,
    core_version: Option<u8>,
    stats: StreamStats,
}

impl Device {
    /// Open sockets to the device and perform the handshake
    pub fn connect(options: ConnectOptions) -> Result<Self, ConnectError> {
        let (control, input) = options.resolve()?;
        let transport = SocketTransport::open(control, input, options.batched_send)?;
        tracing::info!(
            "connecting to {} (input port {}, compression {}, payload {} bytes{})",
            control,
            input.port(),
            options.compression.as_u8(),
            options.mtu_payload(),
            if options.batched_send { ", batched" } else { "" }
        );
        Self::with_transport(transport, MonotonicClock::new(), options)
    }
}

impl<T: Transport, C: Clock> Device<T, C> {
    /// Perform the handshake over an existing transport
    pub fn with_transport(transport: T, clock: C, options: ConnectOptions) -> Result<Self, ConnectError> {
        let mut device = Device {
            transport,
            clock,
            mtu: options.mtu_payload(),
            connected: false,
            status: StatusTracker::new(),
            inputs: InputState::new(),
            encoder: FrameEncoder::new(
                options.compression,
                options.delta_frames,
                options.pixel_format,
            ),
            scheduler: FrameScheduler::new(options.margin_ns),
            gate: CongestionGate::new(),
            audio: AudioBuffer::new(),
            timing: None,
            core_version: None,
            stats: StreamStats::default(),
            options,
        };
        device.handshake()?;
        Ok(device)
    }

    fn handshake(&mut self) -> Result<(), ConnectError> {
        let init = Command::Init(InitParams {
            compressed: self.options.compression != CompressionLevel::Raw,
            sound_rate_code: sound_rate_code(self.options.sound_rate),
            sound_channels: self.options.sound_channels,
            pixel_format: self.options.pixel_format,
        });
        self.transport.send(&init.to_bytes());

        let timeout = self.options.handshake_timeout();
        let timeout_ns = duration_ns(timeout);
        let start = self.clock.now_ns();
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            while let Some(n) = self.transport.try_recv(&mut buf) {
                match n {
                    STATUS_SIZE => {
                        let rtt = self.clock.elapsed_since(start);
                        if let Ok(status) = DeviceStatus::from_bytes(&buf[..n]) {
                            self.status.offer(status);
                        }
                        self.connected = true;
                        self.scheduler.set_ping(rtt);
                        self.scheduler.start(self.clock.now_ns());
                        tracing::info!("ACK received after {:.3} ms", rtt as f64 / 1e6);
                        return Ok(());
                    }
                    VERSION_SIZE => self.core_version = Some(buf[0]),
                    other => tracing::trace!("ignoring {} byte reply during handshake", other),
                }
            }

            if self.clock.elapsed_since(start) >= timeout_ns {
                tracing::warn!("no ACK from device within {:?}", timeout);
                return Err(ConnectError::NoAck { timeout });
            }
            std::hint::spin_loop();
        }
    }

    /// Tear the session down and handshake again on fresh sockets
    pub fn reconnect(&mut self) -> Result<(), ConnectError> {
        self.close();
        self.status.reset();
        self.inputs.reset();
        self.encoder = FrameEncoder::new(
            self.options.compression,
            self.options.delta_frames,
            self.options.pixel_format,
        );
        self.scheduler = FrameScheduler::new(self.options.margin_ns);
        self.gate.reset();
        self.audio.clear();
        self.timing = None;
        self.core_version = None;
        self.stats = StreamStats::default();

        self.transport.reopen()?;
        let result = self.handshake();
        if result.is_err() {
            self.transport.close();
        }
        result
    }

    /// Send CLOSE and release the sockets
    ///
    /// Safe to call repeatedly; CLOSE is only sent for a live session.
    pub fn close(&mut self) {
        if self.connected {
            self.transport.send(&Command::Close.to_bytes());
            self.connected = false;
            tracing::info!(
                "session closed after {} fields ({} bytes streamed)",
                self.stats.fields,
                self.stats.streamed_bytes
            );
        }
        self.transport.close();
    }

    /// Negotiate and apply a video mode
    ///
    /// The computed timing is returned even when disconnected, in which
    /// case nothing is sent or applied.
    pub fn switch_mode(&mut self, request: &ModeRequest) -> ModeTiming {
        let timing = compute_mode(request);
        if !self.connected {
            return timing;
        }

        self.transport.send(&Command::SwitchRes(timing.mode).to_bytes());
        self.encoder.set_mode(&timing);
        self.scheduler.set_mode(&timing.mode);
        self.timing = Some(timing);

        let mode = &timing.mode;
        tracing::info!(
            "mode {}x{} @ {:.6} MHz, htotal {}, vtotal {}, interlace {}",
            mode.h_active,
            mode.v_active,
            mode.pixel_clock,
            mode.h_total,
            mode.v_total,
            mode.interlace.as_u8()
        );
        timing
    }

    /// Switch to a core resolution using the configured family
    pub fn set_resolution(&mut self, width: u16, height: u16, refresh_hz: f64) -> ModeTiming {
        let request = ModeRequest {
            width,
            height,
            refresh_hz,
            family: self.options.family,
            progressive_buffer: self.options.progressive_buffer,
        };
        self.switch_mode(&request)
    }

    /// Encode and send one field
    ///
    /// `source` is a progressive RGB888 frame of the active size. A zero
    /// `vsync_line` lets the scheduler pick the presentation line.
    pub fn blit(&mut self, source: &[u8], field: u8, vsync_line: u16) -> Option<FrameHeader> {
        if !self.connected || self.timing.is_none() {
            return None;
        }

        let frame = self.scheduler.next_frame(self.status.current().frame);
        let prepared = self.encoder.prepare_field(source, field);
        let vsync_line = match vsync_line {
            0 => self.scheduler.vsync_target(),
            line => line,
        };
        let encoded = self.encoder.encode(&prepared);
        if encoded.downgraded {
            self.stats.downgrades += 1;
        }

        let header = FrameHeader {
            frame,
            field: prepared.field,
            vsync_line,
            payload: encoded.kind,
        };
        self.transport.send(&Command::Blit(header).to_bytes());
        self.stats
            .record_field(encoded.kind, encoded.field_size, encoded.body_len());

        if encoded.kind.is_duplicate() {
            tracing::trace!(frame, field = header.field, vsync_line, "duplicate field");
            return Some(header);
        }

        self.gate.wait(&self.clock);
        self.stats.congestion_waits = self.gate.waits();

        let start = self.clock.now_ns();
        self.transport
            .send_stream(self.encoder.payload(&encoded), self.mtu);
        let end = self.clock.now_ns();
        self.gate.record(encoded.body_len(), end);
        self.scheduler.record_stream(end.saturating_sub(start));

        tracing::trace!(
            frame,
            field = header.field,
            vsync_line,
            payload = ?encoded.kind,
            matched = prepared.matched,
            "blit"
        );
        Some(header)
    }

    /// Pace the caller against the device raster
    pub fn wait_sync(&mut self) -> Option<SyncReport> {
        if !self.connected || self.timing.is_none() {
            return None;
        }

        let mut echoes = Echoes {
            transport: &mut self.transport,
            status: &mut self.status,
            core_version: &mut self.core_version,
        };
        let report = self.scheduler.wait_sync(&self.clock, &mut echoes);
        if report.is_late() {
            self.stats.late_syncs += 1;
        }
        Some(report)
    }

    /// Blit one field and wait for the device
    pub fn present(&mut self, source: &[u8], field: u8, vsync_line: u16) -> Option<SyncReport> {
        self.blit(source, field, vsync_line)?;
        self.wait_sync()
    }

    /// Field the device will scan next (always 0 unless fields are scanned separately)
    pub fn next_field(&self) -> u8 {
        match self.timing {
            Some(timing) if timing.mode.interlace.is_interlaced() && !timing.buffer_progressive => {
                let status = self.status.current();
                let parity = (!status.flags.field_parity) as u8;
                let offset = (self.scheduler.frame().wrapping_sub(status.frame) % 2) as u8;
                parity ^ offset
            }
            _ => 0,
        }
    }

    /// Drain pending status echoes; true if a newer one arrived
    pub fn poll_status(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        drain_control(&mut self.transport, &mut self.status, &mut self.core_version)
    }

    /// Drain pending input datagrams; true if any snapshot was replaced
    pub fn poll_inputs(&mut self) -> bool {
        if !self.connected {
            return false;
        }

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut applied = false;
        while let Some(n) = self.transport.try_recv_input(&mut buf) {
            applied |= self.inputs.apply_bytes(&buf[..n]);
        }
        applied
    }

    /// Queue PCM bytes for the next [`flush_audio`](Self::flush_audio)
    pub fn push_audio(&mut self, pcm: &[u8]) -> usize {
        self.audio.push(pcm)
    }

    /// Send queued PCM if the device accepts audio
    ///
    /// The queue is emptied either way. Returns true if samples were sent.
    pub fn flush_audio(&mut self) -> bool {
        let ready = self.connected
            && self.timing.is_some()
            && self.status.current().flags.audio_enabled
            && !self.audio.is_empty();

        if ready {
            let size = self.audio.len() as u16;
            self.transport.send(&Command::Audio { size }.to_bytes());
            self.transport.send_stream(self.audio.samples(), self.mtu);
            self.stats.audio_bytes += size as u64;
        }
        self.audio.clear();
        ready
    }

    /// Ask the device for its core version
    pub fn query_version(&mut self) -> Option<u8> {
        if !self.connected {
            return None;
        }

        self.core_version = None;
        self.transport.send(&Command::GetVersion.to_bytes());

        let timeout_ns = duration_ns(self.options.handshake_timeout());
        let start = self.clock.now_ns();
        loop {
            drain_control(&mut self.transport, &mut self.status, &mut self.core_version);
            if let Some(version) = self.core_version {
                tracing::debug!("core version {}", version);
                return Some(version);
            }
            if self.clock.elapsed_since(start) >= timeout_ns {
                tracing::debug!("no version reply");
                return None;
            }
            std::hint::spin_loop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn status(&self) -> &DeviceStatus {
        self.status.current()
    }

    pub fn inputs(&self) -> &InputState {
        &self.inputs
    }

    /// Active mode, if one was negotiated
    pub fn timing(&self) -> Option<&ModeTiming> {
        self.timing.as_ref()
    }

    pub fn core_version(&self) -> Option<u8> {
        self.core_version
    }

    /// Number of the last frame sent
    pub fn frame(&self) -> u32 {
        self.scheduler.frame()
    }

    /// Compression level in effect, after any adaptive fallback
    pub fn compression(&self) -> CompressionLevel {
        self.encoder.level()
    }

    /// Round trip measured by the handshake
    pub fn ping_ns(&self) -> u64 {
        self.scheduler.ping_ns()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport, C: Clock> Drop for Device<T, C> {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain_control<T: Transport>(
    transport: &mut T,
    status: &mut StatusTracker,
    core_version: &mut Option<u8>,
) -> bool {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut fresh = false;
    while let Some(n) = transport.try_recv(&mut buf) {
        match n {
            STATUS_SIZE => {
                if let Ok(echo) = DeviceStatus::from_bytes(&buf[..n]) {
                    fresh |= status.offer(echo);
                }
            }
            VERSION_SIZE => *core_version = Some(buf[0]),
            other => tracing::trace!("ignoring {} byte reply", other),
        }
    }
    fresh
}

/// Status echoes read through the session transport
struct Echoes<'a, T> {
    transport: &'a mut T,
    status: &'a mut StatusTracker,
    core_version: &'a mut Option<u8>,
}

impl<T: Transport> RasterFeedback for Echoes<'_, T> {
    fn refresh(&mut self) -> bool {
        drain_control(&mut *self.transport, &mut *self.status, &mut *self.core_version)
    }

    fn status(&self) -> DeviceStatus {
        *self.status.current()
    }
}
