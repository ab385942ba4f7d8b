//! Payload bytes given on the command line.

use anyhow::{bail, Context};

/// Parse a hex string into bytes.
///
/// Whitespace and an optional `0x` prefix are ignored, so `"0x01 00 00 00"`
/// and `"01000000"` give the same four bytes. An empty string is an empty
/// payload.
pub fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    if !digits.is_ascii() {
        bail!("Hex payload contains non-ASCII characters");
    }
    if digits.len() % 2 != 0 {
        bail!("Hex payload has an odd number of digits: {}", digits.len());
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}
