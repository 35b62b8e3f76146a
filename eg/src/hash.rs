// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Domain-separated hashing of heterogeneous cryptographic values into
//! `Z_q`.
//!
//! Every input is canonicalized to a UTF-8 string: group elements as 1024
//! lowercase hex digits, field elements as 64 lowercase hex digits, unsigned
//! integers as lowercase hex with at least two digits, strings verbatim,
//! absence as the literal `null`, and a nested sequence as `[` + the
//! recursive outer form of its parts + `]`. The outer form is
//! `"|" + parts.join("|") + "|"`; its SHA-256 digest reduced modulo `q` is
//! the result.
//!
//! This canonicalization is pinned: the test vectors below are part of the
//! interoperability contract.

use sha2::{Digest, Sha256};

use util::{
    algebra::{FieldElement, GroupElement, ScalarField},
    base16::to_string_hex_bits,
};

/// Bit width at which mod-p elements are canonicalized.
const P_CANONICAL_BITS: u32 = 4096;

/// Bit width at which mod-q elements are canonicalized.
const Q_CANONICAL_BITS: u32 = 256;

/// A single input to [`hash_elems`].
///
/// Use the [`From`] conversions (or the [`hash_elems!`](crate::hash_elems)
/// macro) rather than constructing variants directly.
#[derive(Clone, Debug)]
pub enum HashInput {
    PElement(GroupElement),
    QElement(FieldElement),
    Uint(u64),
    Str(String),
    Null,
    Seq(Vec<HashInput>),
}

impl HashInput {
    fn write_canonical(&self, out: &mut String) {
        match self {
            // The fixed widths make element encodings unambiguous; values are
            // canonical by construction, so the width always suffices.
            HashInput::PElement(x) => match to_string_hex_bits(x.as_biguint(), P_CANONICAL_BITS) {
                Ok(s) => out.push_str(&s),
                Err(_) => out.push_str("null"),
            },
            HashInput::QElement(x) => match to_string_hex_bits(x.value(), Q_CANONICAL_BITS) {
                Ok(s) => out.push_str(&s),
                Err(_) => out.push_str("null"),
            },
            HashInput::Uint(u) => {
                out.push_str(&format!("{u:02x}"));
            }
            HashInput::Str(s) => out.push_str(s),
            HashInput::Null => out.push_str("null"),
            HashInput::Seq(parts) => {
                if parts.is_empty() {
                    // An empty sequence carries no structure of its own.
                    out.push_str("null");
                } else {
                    out.push('[');
                    write_outer_form(parts, out);
                    out.push(']');
                }
            }
        }
    }
}

fn write_outer_form(parts: &[HashInput], out: &mut String) {
    out.push('|');
    for part in parts {
        part.write_canonical(out);
        out.push('|');
    }
}

/// Returns the canonical byte string that [`hash_elems`] digests.
///
/// Exposed so that verifiers and test vectors can pin the canonicalization
/// itself, not just the resulting digests.
pub fn hash_elems_canonical_string(parts: &[HashInput]) -> String {
    let mut out = String::new();
    write_outer_form(parts, &mut out);
    out
}

/// Hashes the canonicalized inputs into an element of `Z_q`.
pub fn hash_elems(field: &ScalarField, parts: &[HashInput]) -> FieldElement {
    let canonical = hash_elems_canonical_string(parts);
    let digest = Sha256::digest(canonical.as_bytes());
    FieldElement::from_bytes_be(digest.as_slice(), field)
}

/// Variadic surface over [`hash_elems`](crate::hash::hash_elems):
/// `hash_elems!(field; a, b, c)`.
#[macro_export]
macro_rules! hash_elems {
    ( $field:expr ; $( $x:expr ),+ $(,)? ) => {
        $crate::hash::hash_elems(
            $field,
            &[ $( $crate::hash::HashInput::from($x) ),+ ],
        )
    };
}

impl From<&GroupElement> for HashInput {
    fn from(x: &GroupElement) -> Self {
        HashInput::PElement(x.clone())
    }
}

impl From<&FieldElement> for HashInput {
    fn from(x: &FieldElement) -> Self {
        HashInput::QElement(x.clone())
    }
}

impl From<u64> for HashInput {
    fn from(x: u64) -> Self {
        HashInput::Uint(x)
    }
}

impl From<u32> for HashInput {
    fn from(x: u32) -> Self {
        HashInput::Uint(x as u64)
    }
}

impl From<&str> for HashInput {
    fn from(x: &str) -> Self {
        HashInput::Str(x.to_owned())
    }
}

impl From<&String> for HashInput {
    fn from(x: &String) -> Self {
        HashInput::Str(x.clone())
    }
}

impl From<Vec<HashInput>> for HashInput {
    fn from(x: Vec<HashInput>) -> Self {
        HashInput::Seq(x)
    }
}

impl<T> From<Option<T>> for HashInput
where
    T: Into<HashInput>,
{
    fn from(x: Option<T>) -> Self {
        match x {
            Some(inner) => inner.into(),
            None => HashInput::Null,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;
    use util::algebra::FieldElement;

    fn toy_field() -> ScalarField {
        ScalarField::new_unchecked(BigUint::from(127_u8))
    }

    #[test]
    fn test_canonical_string_pinned() {
        // The pinned canonicalization vector: strings verbatim, small
        // integers as two hex digits, absence as `null`, nested sequences
        // bracketed.
        let parts = [
            HashInput::from("abc"),
            HashInput::from(1_u64),
            HashInput::from(Option::<u64>::None),
            HashInput::from(vec![HashInput::from("x"), HashInput::from("y")]),
        ];
        assert_eq!(hash_elems_canonical_string(&parts), "|abc|01|null|[|x|y|]|");
    }

    #[test]
    fn test_hash_matches_canonical_digest() {
        let field = toy_field();
        let parts = [
            HashInput::from("abc"),
            HashInput::from(1_u64),
            HashInput::from(Option::<u64>::None),
            HashInput::from(vec![HashInput::from("x"), HashInput::from("y")]),
        ];

        let expected = FieldElement::from_bytes_be(
            sha2::Sha256::digest(b"|abc|01|null|[|x|y|]|").as_slice(),
            &field,
        );
        assert_eq!(hash_elems(&field, &parts), expected);
    }

    #[test]
    fn test_element_widths() {
        let field = ScalarField::new_unchecked(BigUint::from(65537_u32));
        let x = FieldElement::from(0xab_u8, &field);
        let s = hash_elems_canonical_string(&[HashInput::from(&x)]);
        // "|" + 64 hex digits + "|"
        assert_eq!(s.len(), 66);
        assert!(s.ends_with("ab|"));
    }

    #[test]
    fn test_empty_sequence_is_null() {
        let parts = [HashInput::Seq(vec![])];
        assert_eq!(hash_elems_canonical_string(&parts), "|null|");
    }

    #[test]
    fn test_distinct_inputs_distinct_hashes() {
        let field = toy_field();
        // Small field, so compare canonical strings rather than reduced
        // digests.
        let a = hash_elems_canonical_string(&[HashInput::from("ab"), HashInput::from("c")]);
        let b = hash_elems_canonical_string(&[HashInput::from("a"), HashInput::from("bc")]);
        assert_ne!(a, b);

        let ha = hash_elems(&field, &[HashInput::from("ab")]);
        assert!(ha.is_valid(&field));
    }
}
