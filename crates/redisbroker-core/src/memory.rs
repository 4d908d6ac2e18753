//! Memory size strings as accepted by `maxmemory`.
//!
//! Units follow redis: `k`/`m`/`g` are powers of 1000, `kb`/`mb`/`gb` are
//! powers of 1024. Case, commas and spaces are ignored.

use crate::error::{ConfError, ConfResult};

const UNITS: &[(&str, u64)] = &[
    ("gb", 1024 * 1024 * 1024),
    ("mb", 1024 * 1024),
    ("kb", 1024),
    ("g", 1_000_000_000),
    ("m", 1_000_000),
    ("k", 1_000),
    ("b", 1),
];

/// Convert a size like `"123kb"` into a decimal byte count (`"125952"`).
pub fn parse_memory_string_to_bytes(raw: &str) -> ConfResult<String> {
    let normalised: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| normalised.strip_suffix(suffix).map(|d| (d, *mult)))
        .unwrap_or((normalised.as_str(), 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| ConfError::InvalidMemorySize(raw.to_string()))?;
    value
        .checked_mul(multiplier)
        .map(|bytes| bytes.to_string())
        .ok_or_else(|| ConfError::InvalidMemorySize(raw.to_string()))
}
