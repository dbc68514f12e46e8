//! # Address
//!
//! Parses fixed-address section annotations such as `.text.0x401000`

use std::fmt;

use thiserror::Error;

/// Prefix every fixed-address section name starts with
pub const SECTION_PREFIX: &str = ".text.0x";

/// Errors when reading an address out of a section annotation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Section name is not a fixed-address section
    #[error("section name does not start with '.text.0x'")]
    MissingPrefix,
    /// Text after the prefix is empty or is not entirely hexadecimal digits
    #[error("unable to parse hexadecimal value '{0}'")]
    InvalidHex(String),
    /// Hexadecimal value does not fit in 32 bits
    #[error("unable to parse hexadecimal value '{0}'")]
    Overflow(String),
}

impl AddressError {
    /// Whether this error should be reported to the user
    ///
    /// Sections that are not fixed-address sections are skipped silently.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, AddressError::MissingPrefix)
    }
}

/// Parses a section annotation into an address
///
/// The whole text after [`SECTION_PREFIX`] must be consumed by the hex digits, so `.text.0x12.5`
/// is rejected rather than read as `0x12`.
pub fn parse_address(raw: &str) -> Result<u32, AddressError> {
    let digits = raw
        .strip_prefix(SECTION_PREFIX)
        .ok_or(AddressError::MissingPrefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidHex(digits.to_owned()));
    }
    // digits are validated above, so the only remaining failure is overflow
    u32::from_str_radix(digits, 16).map_err(|_| AddressError::Overflow(digits.to_owned()))
}

/// Displays an address as `0x` followed by at least six uppercase hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAddress(pub u32);

impl fmt::Display for FixedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}
