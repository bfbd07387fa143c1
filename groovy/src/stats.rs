//! Session statistics

use groovy_protocol::PayloadKind;

/// Counters for one streaming session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub fields: u64,
    pub raw_fields: u64,
    pub compressed_fields: u64,
    pub delta_fields: u64,
    pub duplicate_fields: u64,
    /// Uncompressed size of every field sent
    pub field_bytes: u64,
    /// Video bytes actually streamed after the headers
    pub streamed_bytes: u64,
    pub audio_bytes: u64,
    pub late_syncs: u64,
    pub congestion_waits: u64,
    pub downgrades: u64,
}

impl StreamStats {
    /// Count one sent field
    pub fn record_field(&mut self, kind: PayloadKind, field_size: usize, streamed: usize) {
        self.fields += 1;
        self.field_bytes += field_size as u64;
        self.streamed_bytes += streamed as u64;
        match kind {
            PayloadKind::Raw => self.raw_fields += 1,
            PayloadKind::Compressed { .. } => self.compressed_fields += 1,
            PayloadKind::Delta { .. } => self.delta_fields += 1,
            PayloadKind::Duplicate => self.duplicate_fields += 1,
        }
    }

    /// Streamed bytes over uncompressed bytes (1.0 when nothing was sent)
    pub fn compression_ratio(&self) -> f64 {
        if self.field_bytes == 0 {
            1.0
        } else {
            self.streamed_bytes as f64 / self.field_bytes as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_field() {
        let mut stats = StreamStats::default();
        assert_eq!(stats.compression_ratio(), 1.0);

        stats.record_field(PayloadKind::Raw, 1000, 1000);
        stats.record_field(PayloadKind::Compressed { len: 250 }, 1000, 250);
        stats.record_field(PayloadKind::Duplicate, 1000, 0);

        assert_eq!(stats.fields, 3);
        assert_eq!(stats.raw_fields, 1);
        assert_eq!(stats.compressed_fields, 1);
        assert_eq!(stats.duplicate_fields, 1);
        assert!((stats.compression_ratio() - 1250.0 / 3000.0).abs() < 1e-9);
    }
}
