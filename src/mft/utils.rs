use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};

/// Converts a Windows FILETIME (100 ns ticks since 1601-01-01) to `DateTime<Utc>`.
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    // 116444736000000000 ticks between 1601-01-01 and the Unix epoch
    let unix_time_100ns = filetime.saturating_sub(116_444_736_000_000_000);
    let seconds = (unix_time_100ns / 10_000_000) as i64;
    let nanoseconds = ((unix_time_100ns % 10_000_000) * 100) as u32;

    Utc.timestamp_opt(seconds, nanoseconds)
        .single()
        .unwrap_or_default()
}

/// Little-endian UTF-16 code units; a trailing odd byte is ignored.
pub fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(LittleEndian::read_u16).collect()
}
