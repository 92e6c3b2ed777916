//! Small helpers: clocks, timestamp parsing, id generation, numeric
//! formatting, frame decompression.

use std::io::Read;

use chrono::{DateTime, Utc};

use crate::error::{QuantError, Result};

/// Current timestamp in milliseconds.
pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current timestamp in seconds.
pub fn timestamp_secs() -> i64 {
    Utc::now().timestamp()
}

/// Parse an exchange UTC time string (e.g. `2019-03-04T09:14:27.806Z`) into
/// epoch milliseconds.
pub fn utctime_str_to_ms(s: &str) -> Result<i64> {
    let dt = DateTime::parse_from_rfc3339(s)
        .map_err(|e| QuantError::InvalidArgument(format!("bad timestamp {s:?}: {e}")))?;
    Ok(dt.timestamp_millis())
}

/// OKEx signature timestamps: epoch seconds with exactly three fractional
/// digits, e.g. `1546300800.123`.
pub fn timestamp_str_3f() -> String {
    let ms = timestamp_ms();
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Convert a float to a plain decimal string, never scientific notation.
///
/// Exchange APIs reject `1e-7`-style numbers; `f64`'s `Display` always
/// produces the shortest decimal form (`0.0000001`).
pub fn float_to_str(value: f64) -> String {
    format!("{value}")
}

/// Generate a time-based (version 1) UUID string.
pub fn uuid1() -> String {
    uuid::Uuid::now_v1(&node_id()).to_string()
}

/// Generate a version 1 UUID with the dashes removed, suitable for client
/// order ids.
pub fn uuid1_compact() -> String {
    uuid::Uuid::now_v1(&node_id()).simple().to_string()
}

/// Decompress a raw-deflate frame (no zlib header) into text. OKEx
/// compresses every WebSocket frame this way.
pub fn inflate_raw(data: &[u8]) -> Result<String> {
    let mut decoder = flate2::read::DeflateDecoder::new(data);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

/// Per-process pseudo node id for v1 UUIDs. The multicast bit is set, as
/// required for node ids that are not real MAC addresses.
fn node_id() -> [u8; 6] {
    let pid = std::process::id();
    [
        0x01,
        (pid >> 24) as u8,
        (pid >> 16) as u8,
        (pid >> 8) as u8,
        pid as u8,
        0x9d,
    ]
}
