//! Pure, deterministic integer helpers shared by the generator and the
//! dispatcher: hex <-> integer conversion and power-of-two batch sizing.
//!
//! Everything here operates on arbitrary-precision integers rather than a
//! fixed-width buffer: the coordinator never performs elliptic-curve scalar
//! math, only interval bookkeeping up to [`MAX_RANGE_BITS`] bits, so a
//! `BigUint` is simpler and plenty fast for that job.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// The external search binary's `-range` argument is a bit count; this is
/// the largest value it is ever asked to accept.
pub const MAX_RANGE_BITS: u32 = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid hex string: {0:?}")]
    InvalidHex(String),
    #[error("invalid range bits: {0} (must be between 1 and {MAX_RANGE_BITS})")]
    InvalidRangeBits(u32),
}

/// Strips an optional `0x`/`0X` prefix, lower-cases, and rejects anything
/// that isn't a hex digit. An empty string (after stripping) is invalid.
pub fn parse_hex(s: &str) -> Result<BigUint, RangeError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RangeError::InvalidHex(s.to_string()));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(|| RangeError::InvalidHex(s.to_string()))
}

/// Lowercase hex, no `0x` prefix, no padding. `0` formats as `"0"`.
pub fn format_hex(n: &BigUint) -> String {
    n.to_str_radix(16)
}

/// Smallest `N >= 1` with `2^N >= count`. `count <= 1` returns `1`.
pub fn bits_for(count: &BigUint) -> u32 {
    if count <= &BigUint::one() {
        return 1;
    }
    let bits = count.bits() as u32;
    // bits() is floor(log2(count)) + 1, exact only when count is a power of two.
    if is_power_of_two(count) {
        bits - 1
    } else {
        bits
    }
}

/// True iff `count > 0` and `count` has exactly one set bit.
pub fn is_power_of_two(count: &BigUint) -> bool {
    !count.is_zero() && (count & (count - BigUint::one())).is_zero()
}

/// Returns `(2^N, N)` where `N = bits_for(size)`; the adjusted size is
/// always `>= size`.
pub fn adjust_to_power_of_two(size: &BigUint) -> (BigUint, u32) {
    let n = bits_for(size);
    (BigUint::one() << n, n)
}

/// Validates a `-range` argument is within the accepted window, returning
/// `2^range_bits` as the key count it covers.
pub fn total_keys(range_bits: u32) -> Result<BigUint, RangeError> {
    if range_bits == 0 || range_bits > MAX_RANGE_BITS {
        return Err(RangeError::InvalidRangeBits(range_bits));
    }
    Ok(BigUint::one() << range_bits)
}
