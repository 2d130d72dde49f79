//! Byte-size formatting and parsing.
//!
//! Quota and space reports deal in raw byte counts; these helpers render
//! them with 1024-based units and parse human-entered sizes back.

use crate::error::{Error, Result};

const UNITS: &[&str] = &["B", "K", "M", "G", "T", "P"];

/// Format a byte count with 1024-based units (`10.0G`, `512.0M`).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

/// Parse a human byte size (`10G`, `512M`, `1048576`) into bytes.
pub fn parse_bytes(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::ParseError("empty byte size".to_string()));
    }

    let (digits, suffix) = match trimmed.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(index) => trimmed.split_at(index),
        None => (trimmed, ""),
    };

    let value: f64 = digits
        .parse()
        .map_err(|_| Error::ParseError(format!("invalid byte size `{input}`")))?;

    let multiplier: u64 = match suffix.trim().trim_end_matches(['b', 'B']) {
        "" => 1,
        "k" | "K" => 1024,
        "m" | "M" => 1024_u64.pow(2),
        "g" | "G" => 1024_u64.pow(3),
        "t" | "T" => 1024_u64.pow(4),
        "p" | "P" => 1024_u64.pow(5),
        other => {
            return Err(Error::ParseError(format!(
                "unknown byte unit `{other}` in `{input}`"
            )))
        }
    };

    Ok((value * multiplier as f64).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_exact_units() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1024), "1.0K");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10.0G");
    }

    #[test]
    fn parses_plain_and_suffixed() {
        assert_eq!(parse_bytes("1048576").unwrap(), 1_048_576);
        assert_eq!(parse_bytes("512M").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_bytes("10G").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_bytes("10GB").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_bytes("1.5K").unwrap(), 1536);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("tenG").is_err());
        assert!(parse_bytes("10X").is_err());
    }

    #[test]
    fn round_trips_quota_sizes() {
        let quota = 10 * 1024 * 1024 * 1024_u64;
        assert_eq!(parse_bytes(&format_bytes(quota)).unwrap(), quota);
    }
}
