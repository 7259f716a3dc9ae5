//! Human-readable size strings
//!
//! Sizes are written as a decimal magnitude followed by an optional unit
//! letter: `512`, `0.5G`, `100M`, `2T`. Units are powers of 1024.

use crate::error::InventoryError;
use regex::Regex;
use std::sync::LazyLock;

static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d*)?|\.\d+)([KMGT]?)$").expect("size pattern compiles")
});

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Parse a size string into bytes.
///
/// Empty input yields 0, which callers treat as "no size constraint".
/// Leading and trailing whitespace is ignored and units are case-insensitive.
pub fn parse_size(text: &str) -> Result<u64, InventoryError> {
    let normalized = text.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Ok(0);
    }

    let captures = SIZE_PATTERN
        .captures(&normalized)
        .ok_or_else(|| InventoryError::InvalidSizeFormat(text.to_string()))?;

    let multiplier = match &captures[2] {
        "K" => KIB,
        "M" => MIB,
        "G" => GIB,
        "T" => TIB,
        _ => 1,
    };

    let magnitude = &captures[1];
    if let Ok(whole) = magnitude.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| InventoryError::InvalidSizeFormat(text.to_string()));
    }

    let value: f64 = magnitude
        .parse()
        .map_err(|_| InventoryError::InvalidSizeFormat(text.to_string()))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(InventoryError::InvalidSizeFormat(text.to_string()));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_are_powers_of_1024() {
        let cases = [("512", 512), ("4K", 4 * KIB), ("100M", 100 * MIB), ("10G", 10 * GIB), ("2T", 2 * TIB)];
        for (text, expected) in cases {
            assert_eq!(parse_size(text).unwrap(), expected, "{}", text);
        }
    }

    #[test]
    fn test_fractional_magnitudes() {
        assert_eq!(parse_size("0.5G").unwrap(), GIB / 2);
        assert_eq!(parse_size("1.5G").unwrap(), GIB + GIB / 2);
        assert_eq!(parse_size(".25M").unwrap(), MIB / 4);
    }

    #[test]
    fn test_whitespace_and_case_tolerated() {
        assert_eq!(parse_size("  1g").unwrap(), GIB);
        assert_eq!(parse_size("20G ").unwrap(), 20 * GIB);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(parse_size("").unwrap(), 0);
        assert_eq!(parse_size("   ").unwrap(), 0);
    }

    #[test]
    fn test_malformed_sizes_rejected() {
        for text in ["abc", "G", "10X", "1.2.3G", "-5G", "10 G", "20000000T", "20000000.5T"] {
            assert!(
                matches!(parse_size(text), Err(InventoryError::InvalidSizeFormat(_))),
                "{} should be rejected",
                text
            );
        }
    }
}
