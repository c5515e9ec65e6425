//! Payload size parsing
//!
//! Accepts raw byte counts ("1048576") and suffixed sizes. Decimal suffixes
//! (k/KB, m/MB, g/GB) are powers of 10, binary suffixes (Ki/KiB, Mi/MiB, Gi/GiB)
//! are powers of 2. A bare "B" suffix means bytes.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Deserializer};

/// Parse a size string into a byte count.
///
/// - "4096" → 4096
/// - "64k" → 64,000
/// - "1MiB" → 1,048,576
/// - "1.5MiB" → 1,572,864
pub fn parse_size(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty size");
    }

    if let Ok(num) = input.parse::<u64>() {
        return Ok(num);
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| anyhow!("invalid size: {}", input))?;
    let (number, suffix) = input.split_at(split);
    if number.is_empty() {
        bail!("size has no number: {}", input);
    }

    let value: f64 = number
        .parse()
        .map_err(|_| anyhow!("invalid number in size: {}", input))?;
    let multiplier = suffix_multiplier(suffix.trim())?;

    Ok((value * multiplier as f64).round() as u64)
}

fn suffix_multiplier(suffix: &str) -> Result<u64> {
    match suffix.to_uppercase().as_str() {
        "B" => Ok(1),
        "K" | "KB" => Ok(1_000),
        "M" | "MB" => Ok(1_000_000),
        "G" | "GB" => Ok(1_000_000_000),
        "KI" | "KIB" => Ok(1 << 10),
        "MI" | "MIB" => Ok(1 << 20),
        "GI" | "GIB" => Ok(1 << 30),
        _ => bail!(
            "unknown size suffix '{}' (expected B, k/KB/KiB, m/MB/MiB, g/GB/GiB)",
            suffix
        ),
    }
}

/// Deserialize a size given either as a number or as a suffixed string
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(u64),
        Text(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_numbers() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1048576").unwrap(), 1_048_576);
        assert_eq!(parse_size("  512 ").unwrap(), 512);
    }

    #[test]
    fn test_decimal_and_binary_suffixes() {
        assert_eq!(parse_size("64k").unwrap(), 64_000);
        assert_eq!(parse_size("64KiB").unwrap(), 65_536);
        assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
        assert_eq!(parse_size("1mib").unwrap(), 1_048_576);
        assert_eq!(parse_size("2Gi").unwrap(), 2_147_483_648);
        assert_eq!(parse_size("100B").unwrap(), 100);
    }

    #[test]
    fn test_fractional() {
        assert_eq!(parse_size("1.5MiB").unwrap(), 1_572_864);
        assert_eq!(parse_size("0.5k").unwrap(), 500);
    }

    #[test]
    fn test_payload_size_matches_default() {
        assert_eq!(
            parse_size("1MiB").unwrap(),
            crate::constants::DEFAULT_PAYLOAD_SIZE
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MiB").is_err());
        assert!(parse_size("-1k").is_err());
        assert!(parse_size("12XB").is_err());
    }
}
