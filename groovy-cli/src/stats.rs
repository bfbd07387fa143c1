//! Statistics display and formatting

use groovy::StreamStats;
use std::time::Duration;

/// Scale `value` to the largest unit it reaches, two decimals past the base unit
fn scaled(value: u64, base: u64, units: &[&str]) -> String {
    let mut unit = 0;
    let mut divisor = 1u64;
    while unit + 1 < units.len() && value >= divisor * base {
        divisor *= base;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", value, units[0])
    } else {
        format!("{:.2} {}", value as f64 / divisor as f64, units[unit])
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    scaled(bytes, 1024, &["B", "KB", "MB", "GB"])
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    scaled(bps, 1000, &["bps", "Kbps", "Mbps", "Gbps"])
}

/// Format a nanosecond interval in human-readable form
pub fn format_nanos(ns: u64) -> String {
    if ns >= 1_000_000_000 {
        format!("{:.2}s", ns as f64 / 1e9)
    } else if ns >= 1_000_000 {
        format!("{:.2}ms", ns as f64 / 1e6)
    } else if ns >= 1_000 {
        format!("{:.2}µs", ns as f64 / 1e3)
    } else {
        format!("{}ns", ns)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// One line summary of a session (for continuous updates)
pub fn compact_stats(stats: &StreamStats, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let throughput_bps = if secs > 0.0 {
        ((stats.streamed_bytes + stats.audio_bytes) as f64 * 8.0 / secs) as u64
    } else {
        0
    };

    format!(
        "[{:8}] Fields: {} | Sent: {} | Rate: {} | Ratio: {:.1}% | Dup: {} | Late: {}",
        format_duration(elapsed),
        stats.fields,
        format_bytes(stats.streamed_bytes),
        format_bandwidth(throughput_bps),
        stats.compression_ratio() * 100.0,
        stats.duplicate_fields,
        stats.late_syncs
    )
}

/// Display the end of session summary
pub fn display_session_stats(stats: &StreamStats, elapsed: Duration) {
    println!("\n┌─────────────────────────────────────────────────────────────┐");
    println!("│ SESSION STATISTICS                                          │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ Duration: {}", format_duration(elapsed));
    println!(
        "│ Fields:   {} raw / {} compressed / {} delta / {} duplicate",
        stats.raw_fields, stats.compressed_fields, stats.delta_fields, stats.duplicate_fields
    );
    println!(
        "│ Video:    {} of {} ({:.1}%)",
        format_bytes(stats.streamed_bytes),
        format_bytes(stats.field_bytes),
        stats.compression_ratio() * 100.0
    );
    println!("│ Audio:    {}", format_bytes(stats.audio_bytes));
    println!(
        "│ Pacing:   {} late wake-ups, {} congestion waits, {} downgrades",
        stats.late_syncs, stats.congestion_waits, stats.downgrades
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovy::PayloadKind;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
    }

    #[test]
    fn test_format_bandwidth() {
        assert_eq!(format_bandwidth(500), "500 bps");
        assert_eq!(format_bandwidth(10_000), "10.00 Kbps");
        assert_eq!(format_bandwidth(10_000_000), "10.00 Mbps");
    }

    #[test]
    fn test_format_nanos() {
        assert_eq!(format_nanos(500), "500ns");
        assert_eq!(format_nanos(63_556), "63.56µs");
        assert_eq!(format_nanos(16_651_672), "16.65ms");
        assert_eq!(format_nanos(2_000_000_000), "2.00s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 01m 01s");
    }

    #[test]
    fn test_compact_stats() {
        let mut stats = StreamStats::default();
        stats.record_field(PayloadKind::Compressed { len: 256 }, 1024, 256);
        let line = compact_stats(&stats, Duration::from_secs(1));
        assert!(line.contains("Fields: 1"));
        assert!(line.contains("Ratio: 25.0%"));
        assert!(line.contains("Rate: 2.05 Kbps"));
    }
}
