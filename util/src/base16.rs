// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Conversions between [`BigUint`] and the fixed-width, zero-padded,
//! lowercase hex form used on the wire. No `0x` prefix ever.

use anyhow::{ensure, Result};
use num_bigint::BigUint;
use num_traits::Num;

/// Converts a [`BigUint`] to lowercase hex with no prefix, left-padded with
/// zeros to the number of bytes required to hold `fixed_len_bits`.
///
/// Returns an error if the value does not fit.
pub fn to_string_hex_bits(u: &BigUint, fixed_len_bits: u32) -> Result<String> {
    let fixed_len_bytes = (fixed_len_bits as u64).max(1).div_ceil(8);
    let fixed_len_digits = (fixed_len_bytes * 2) as usize;

    let s = format!("{u:x}");
    ensure!(
        s.len() <= fixed_len_digits,
        "Value of {} hex digits is too large for a fixed width of {fixed_len_digits} digits.",
        s.len()
    );

    let mut out = String::with_capacity(fixed_len_digits);
    out.extend(std::iter::repeat('0').take(fixed_len_digits - s.len()));
    out.push_str(&s);
    Ok(out)
}

/// Parses a fixed-width lowercase hex string back into a [`BigUint`].
///
/// The string must be exactly the width implied by `fixed_len_bits` and
/// consist only of lowercase hex digits.
pub fn biguint_from_str_hex_bits(s: &str, fixed_len_bits: u32) -> Result<BigUint> {
    let fixed_len_bytes = (fixed_len_bits as u64).max(1).div_ceil(8);
    let fixed_len_digits = (fixed_len_bytes * 2) as usize;

    ensure!(
        s.len() == fixed_len_digits,
        "Expected exactly {fixed_len_digits} hex digits, got {}.",
        s.len()
    );
    ensure!(
        s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
        "Non-lowercase-hex character in input."
    );

    BigUint::from_str_radix(s, 16).map_err(Into::into)
}

/// Builds a [`BigUint`] from a hex string literal, ignoring ASCII whitespace.
///
/// Intended for compiled-in constants only; panics on a non-hex character.
#[allow(clippy::panic)]
pub fn hex_to_biguint(s: &str) -> BigUint {
    let digits: String = s.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match BigUint::from_str_radix(&digits, 16) {
        Ok(u) => u,
        Err(e) => panic!("invalid hex literal: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn test_to_string_hex_bits() {
        let u = BigUint::from(0xabc_u32);
        assert_eq!(to_string_hex_bits(&u, 16).unwrap(), "0abc");
        assert_eq!(to_string_hex_bits(&u, 32).unwrap(), "00000abc");
        assert!(to_string_hex_bits(&u, 8).is_err());
    }

    #[test]
    fn test_biguint_from_str_hex_bits() {
        assert_eq!(
            biguint_from_str_hex_bits("0abc", 16).unwrap(),
            BigUint::from(0xabc_u32)
        );
        // Wrong width.
        assert!(biguint_from_str_hex_bits("abc", 16).is_err());
        // Uppercase is not canonical.
        assert!(biguint_from_str_hex_bits("0ABC", 16).is_err());
    }

    #[test]
    fn test_hex_to_biguint() {
        assert_eq!(
            hex_to_biguint(
                "
                FF FF"
            ),
            BigUint::from(0xffff_u32)
        );
    }

    #[test]
    fn test_round_trip() {
        let u = hex_to_biguint("1234567890abcdef");
        let s = to_string_hex_bits(&u, 256).unwrap();
        assert_eq!(s.len(), 64);
        assert_eq!(biguint_from_str_hex_bits(&s, 256).unwrap(), u);
    }
}
