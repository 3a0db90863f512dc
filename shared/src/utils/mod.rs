//! Utility functions and helpers

pub mod time;

use thiserror::Error;

/// Error returned when an address string cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address: {0:?}")]
pub struct AddressParseError(pub String);

/// Render an instruction address the way unresolved frames are named
pub fn format_address(address: u64) -> String {
    format!("0x{:x}", address)
}

/// Parse a hexadecimal address, with or without a `0x` prefix
pub fn parse_address(s: &str) -> Result<u64, AddressParseError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(AddressParseError(s.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| AddressParseError(s.to_string()))
}
