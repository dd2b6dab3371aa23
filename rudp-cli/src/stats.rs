//! Session statistics formatting

use rudp::io::ChannelStats;
use rudp::EngineStats;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Fraction of lossy sends the fault model discarded
pub fn drop_rate(channel: &ChannelStats) -> f64 {
    if channel.attempts == 0 {
        0.0
    } else {
        channel.dropped as f64 / channel.attempts as f64
    }
}

/// One-line summary of an engine session
pub fn summarize(engine: &EngineStats, channel: &ChannelStats) -> String {
    format!(
        "sent={} resent={} delivered={} duplicates={} | datagrams out={} in={} dropped={} ({:.1}%) corrupted={}",
        engine.transmissions,
        engine.retransmissions,
        engine.delivered,
        engine.duplicates,
        channel.sent,
        channel.received,
        channel.dropped,
        drop_rate(channel) * 100.0,
        channel.corrupted,
    )
}
