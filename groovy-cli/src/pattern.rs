//! Synthetic video and audio sources

use groovy::VideoMode;

/// Eight vertical color bars with a moving block in the inverse color
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: usize,
    height: usize,
    frame: Vec<u8>,
}

const BARS: [[u8; 3]; 8] = [
    [0xff, 0xff, 0xff],
    [0xff, 0xff, 0x00],
    [0x00, 0xff, 0xff],
    [0x00, 0xff, 0x00],
    [0xff, 0x00, 0xff],
    [0xff, 0x00, 0x00],
    [0x00, 0x00, 0xff],
    [0x00, 0x00, 0x00],
];

const BLOCK: usize = 16;

impl TestPattern {
    pub fn new(width: u16, height: u16) -> Self {
        let (width, height) = (width as usize, height as usize);
        TestPattern {
            width,
            height,
            frame: vec![0; width * height * 3],
        }
    }

    /// Pattern covering the active area of a negotiated mode
    ///
    /// Fields are cut from frames of exactly this size, which may differ
    /// from the resolution that was requested.
    pub fn for_mode(mode: &VideoMode) -> Self {
        Self::new(mode.h_active, mode.v_active)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Render frame `n` as RGB888 with the block shifted `n * scroll` pixels
    pub fn render(&mut self, n: u64, scroll: u16) -> &[u8] {
        let bar_width = (self.width / BARS.len()).max(1);
        let span = self.width.saturating_sub(BLOCK).max(1) as u64;
        let block_x = ((n * scroll as u64) % span) as usize;
        let block_y = self.height.saturating_sub(BLOCK) / 2;

        for (i, px) in self.frame.chunks_exact_mut(3).enumerate() {
            let x = i % self.width;
            let y = i / self.width;
            let in_block = (block_x..block_x + BLOCK).contains(&x) && (block_y..block_y + BLOCK).contains(&y);
            let bar = BARS[(x / bar_width).min(BARS.len() - 1)];
            let color = if in_block { bar.map(|c| !c) } else { bar };
            px.copy_from_slice(&color);
        }
        &self.frame
    }
}

/// 16-bit PCM square wave
#[derive(Debug, Clone)]
pub struct SquareWave {
    rate: u32,
    channels: u8,
    frequency: u32,
    phase: u64,
}

impl SquareWave {
    const AMPLITUDE: i16 = 4000;

    pub fn new(rate: u32, channels: u8, frequency: u32) -> Self {
        SquareWave {
            rate,
            channels: channels.max(1),
            frequency: frequency.max(1),
            phase: 0,
        }
    }

    /// Samples for `duration_ns` of playback, little endian and interleaved
    pub fn next_block(&mut self, duration_ns: u64) -> Vec<u8> {
        let frames = (self.rate as u64 * duration_ns / 1_000_000_000) as usize;
        let half_period = (self.rate / self.frequency / 2).max(1) as u64;
        let mut pcm = Vec::with_capacity(frames * self.channels as usize * 2);

        for _ in 0..frames {
            let sample = if (self.phase / half_period) % 2 == 0 {
                Self::AMPLITUDE
            } else {
                -Self::AMPLITUDE
            };
            for _ in 0..self.channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase += 1;
        }
        pcm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovy::protocol::compute_mode;
    use groovy::{ModeRequest, OutputFamily};

    #[test]
    fn test_pattern_size_and_motion() {
        let mut pattern = TestPattern::new(320, 240);
        let first = pattern.render(0, 2).to_vec();
        assert_eq!(first.len(), 320 * 240 * 3);
        // top-left is the white bar
        assert_eq!(&first[..3], &[0xff, 0xff, 0xff]);

        let second = pattern.render(1, 2).to_vec();
        assert_ne!(first, second);
        assert_eq!(pattern.render(0, 2), &first[..]);
    }

    #[test]
    fn test_block_contrasts_with_bar() {
        let mut pattern = TestPattern::new(320, 240);
        let frame = pattern.render(0, 1);
        // block starts at x = 0, y = (240 - 16) / 2 over the white bar
        let offset = 112 * 320 * 3;
        assert_eq!(&frame[offset..offset + 3], &[0, 0, 0]);
        assert_eq!(&frame[offset + 16 * 3..offset + 17 * 3], &[0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_pattern_follows_negotiated_mode() {
        let timing = compute_mode(&ModeRequest {
            width: 300,
            height: 240,
            refresh_hz: 60.0,
            family: OutputFamily::Auto,
            progressive_buffer: false,
        });
        let mut pattern = TestPattern::for_mode(&timing.mode);
        assert_eq!(pattern.width(), timing.mode.h_active as usize);
        assert_eq!(pattern.height(), timing.mode.v_active as usize);

        let len = pattern.render(0, 1).len();
        assert_eq!(
            len,
            timing.mode.h_active as usize * timing.mode.v_active as usize * 3
        );
    }

    #[test]
    fn test_static_pattern_repeats() {
        let mut pattern = TestPattern::new(64, 32);
        let first = pattern.render(0, 0).to_vec();
        assert_eq!(pattern.render(5, 0), &first[..]);
    }

    #[test]
    fn test_square_wave_block() {
        let mut wave = SquareWave::new(48000, 2, 1000);
        let pcm = wave.next_block(1_000_000);
        // 48 stereo frames of 16 bits
        assert_eq!(pcm.len(), 48 * 2 * 2);
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 4000);
        // 24 samples per half period
        assert_eq!(i16::from_le_bytes([pcm[96], pcm[97]]), -4000);
    }
}
