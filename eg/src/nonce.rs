// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Deterministic nonce derivation.
//!
//! Every encryption nonce on a ballot derives from the device-provided seed,
//! so re-encrypting with the same seed reproduces the ciphertext bit for bit.

use util::algebra::{FieldElement, ScalarField};

use crate::hash_elems;

/// A deterministic stream of field elements derived from a seed.
#[derive(Clone, Debug)]
pub struct NonceSequence {
    seed: FieldElement,
}

impl NonceSequence {
    /// Creates a sequence from a seed.
    pub fn new(seed: &FieldElement) -> Self {
        NonceSequence { seed: seed.clone() }
    }

    /// Creates a sequence whose seed is bound to an additional header,
    /// separating the streams of different consumers of the same base seed.
    pub fn new_with_header(field: &ScalarField, seed: &FieldElement, header: &str) -> Self {
        NonceSequence {
            seed: hash_elems!(field; seed, header),
        }
    }

    /// The `i`-th nonce of the stream, `H(seed, i)`.
    pub fn get(&self, field: &ScalarField, i: u64) -> FieldElement {
        hash_elems!(field; &self.seed, i)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;

    fn toy_field() -> ScalarField {
        ScalarField::new_unchecked(BigUint::from(65537_u32))
    }

    #[test]
    fn test_deterministic() {
        let field = toy_field();
        let seed = FieldElement::from(42_u32, &field);

        let a = NonceSequence::new(&seed);
        let b = NonceSequence::new(&seed);
        assert_eq!(a.get(&field, 0), b.get(&field, 0));
        assert_eq!(a.get(&field, 7), b.get(&field, 7));
        assert_ne!(a.get(&field, 0), a.get(&field, 1));
    }

    #[test]
    fn test_headers_separate_streams() {
        let field = toy_field();
        let seed = FieldElement::from(42_u32, &field);

        let a = NonceSequence::new_with_header(&field, &seed, "selection");
        let b = NonceSequence::new_with_header(&field, &seed, "contest");
        assert_ne!(a.get(&field, 0), b.get(&field, 0));
    }
}
