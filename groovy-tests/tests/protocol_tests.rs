//! Integration tests for the Groovy wire protocol

use groovy_protocol::{
    compute_mode, sound_rate_code, Command, DeviceStatus, FrameHeader, InitParams, InputState,
    JoyButton, ModeRequest, OutputFamily, PayloadKind, PixelFormat, StatusFlags, StatusTracker,
};

fn echo(frame_echo: u32) -> DeviceStatus {
    DeviceStatus {
        frame_echo,
        vcount_echo: 100,
        frame: frame_echo,
        vcount: 120,
        flags: StatusFlags::default(),
    }
}

fn joystick(frame: u32, order: u8, joy1: u16) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(9);
    datagram.extend_from_slice(&frame.to_le_bytes());
    datagram.push(order);
    datagram.extend_from_slice(&joy1.to_le_bytes());
    datagram.extend_from_slice(&0u16.to_le_bytes());
    datagram
}

#[test]
fn test_sound_rate_codes() {
    assert_eq!(sound_rate_code(48000), 3);
    assert_eq!(sound_rate_code(44100), 2);
    assert_eq!(sound_rate_code(22050), 1);
    assert_eq!(sound_rate_code(0), 0);
    assert_eq!(sound_rate_code(96000), 0);
}

#[test]
fn test_init_layout() {
    let init = Command::Init(InitParams {
        compressed: true,
        sound_rate_code: sound_rate_code(48000),
        sound_channels: 2,
        pixel_format: PixelFormat::Rgb565,
    });
    let bytes = init.to_bytes();
    assert_eq!(&bytes[..], &[2, 1, 3, 2, 2]);
    assert_eq!(Command::decode(&bytes).unwrap(), init);
}

#[test]
fn test_single_byte_commands() {
    assert_eq!(&Command::Close.to_bytes()[..], &[1]);
    assert_eq!(&Command::GetStatus.to_bytes()[..], &[5]);
    assert_eq!(&Command::GetVersion.to_bytes()[..], &[8]);
}

#[test]
fn test_audio_layout() {
    let bytes = Command::Audio { size: 0x1234 }.to_bytes();
    assert_eq!(&bytes[..], &[4, 0x34, 0x12]);
}

#[test]
fn test_switchres_layout() {
    let timing = compute_mode(&ModeRequest {
        width: 320,
        height: 240,
        refresh_hz: 59.94,
        family: OutputFamily::Auto,
        progressive_buffer: false,
    });
    let bytes = Command::SwitchRes(timing.mode).to_bytes();

    assert_eq!(bytes.len(), 26);
    assert_eq!(bytes[0], 3);
    assert_eq!(&bytes[1..9], &6.046147f64.to_le_bytes());
    assert_eq!(&bytes[9..11], &320u16.to_le_bytes());
    assert_eq!(&bytes[23..25], &262u16.to_le_bytes());
    assert_eq!(bytes[25], 0);
    assert_eq!(Command::decode(&bytes).unwrap(), Command::SwitchRes(timing.mode));
}

#[test]
fn test_blit_header_sizes() {
    let header = |payload| {
        Command::Blit(FrameHeader {
            frame: 0x0102_0304,
            field: 1,
            vsync_line: 131,
            payload,
        })
        .to_bytes()
    };

    let raw = header(PayloadKind::Raw);
    assert_eq!(&raw[..], &[7, 4, 3, 2, 1, 1, 131, 0]);

    let compressed = header(PayloadKind::Compressed { len: 5000 });
    assert_eq!(compressed.len(), 12);
    assert_eq!(&compressed[8..12], &5000u32.to_le_bytes());

    let delta = header(PayloadKind::Delta { len: 77 });
    assert_eq!(delta.len(), 13);
    assert_eq!(&delta[8..12], &77u32.to_le_bytes());
    assert_eq!(delta[12], 1);

    let duplicate = header(PayloadKind::Duplicate);
    assert_eq!(duplicate.len(), 9);
    assert_eq!(duplicate[8], 1);

    for bytes in [raw, compressed, delta, duplicate] {
        assert!(Command::decode(&bytes).is_ok());
    }
}

#[test]
fn test_status_never_regresses() {
    let mut tracker = StatusTracker::new();
    let mut visible = Vec::new();

    for frame in [5, 3, 6, 6, 4] {
        if tracker.offer(echo(frame)) {
            visible.push(tracker.current().frame_echo);
        }
        assert!(tracker.current().frame_echo >= 5);
    }

    assert_eq!(visible, vec![5, 6]);
    assert_eq!(tracker.current().frame_echo, 6);
    assert_eq!(tracker.accepted(), 2);
    assert_eq!(tracker.discarded(), 3);
}

#[test]
fn test_status_bytes() {
    let mut bytes = echo(9).to_bytes();
    bytes[12] = 0b0110_0001;
    let status = DeviceStatus::from_bytes(&bytes).unwrap();
    assert_eq!(status.frame_echo, 9);
    assert!(status.flags.vram_ready);
    assert!(status.flags.field_parity);
    assert!(status.flags.audio_enabled);
    assert!(!status.flags.vga_vblank);

    assert!(DeviceStatus::from_bytes(&bytes[..12]).is_err());
}

#[test]
fn test_input_ordering() {
    let mut inputs = InputState::new();
    let mut visible = Vec::new();

    for (frame, order) in [(10, 0), (10, 2), (10, 1), (11, 0)] {
        let buttons = JoyButton::B1.mask() | order as u16;
        if inputs.apply_bytes(&joystick(frame, order, buttons)) {
            let order = inputs.joystick().order;
            visible.push((order.frame, order.order));
        }
    }

    assert_eq!(visible, vec![(10, 0), (10, 2), (11, 0)]);
    assert!(inputs.pad(0).is_pressed(JoyButton::B1));
}

#[test]
fn test_input_channels_are_independent() {
    let mut inputs = InputState::new();
    assert!(inputs.apply_bytes(&joystick(20, 0, 0)));

    let mut ps2 = vec![0u8; 37];
    ps2[..4].copy_from_slice(&5u32.to_le_bytes());
    ps2[5 + 0x1c / 8] |= 1 << (0x1c % 8);
    assert!(inputs.apply_bytes(&ps2));
    assert!(inputs.ps2().is_key_down(0x1c));
    assert!(inputs.ps2().mouse.is_none());

    // unknown lengths are ignored
    assert!(!inputs.apply_bytes(&[0u8; 12]));
}
