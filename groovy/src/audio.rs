//! Pending PCM samples
//!
//! Samples accumulate between frames and go out in one AUDIO command whose
//! size field is 16 bits, which bounds the buffer.

/// Largest PCM block one AUDIO command can announce
pub const MAX_AUDIO_SIZE: usize = u16::MAX as usize;

/// Bounded PCM accumulator
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    samples: Vec<u8>,
    dropped: u64,
}

impl AudioBuffer {
    pub fn new() -> Self {
        AudioBuffer {
            samples: Vec::with_capacity(MAX_AUDIO_SIZE),
            dropped: 0,
        }
    }

    /// Append PCM bytes, dropping what does not fit
    ///
    /// Returns the number of bytes accepted.
    pub fn push(&mut self, pcm: &[u8]) -> usize {
        let room = MAX_AUDIO_SIZE - self.samples.len();
        let accepted = pcm.len().min(room);
        self.samples.extend_from_slice(&pcm[..accepted]);

        if accepted < pcm.len() {
            let dropped = pcm.len() - accepted;
            self.dropped += dropped as u64;
            tracing::trace!("audio buffer full, dropped {} bytes", dropped);
        }
        accepted
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
