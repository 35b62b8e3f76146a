// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Exponential ElGamal over the order-`q` subgroup of `Z_p`.
//!
//! A message `m` encrypts to `(g^r, K^r * g^m)`, so ciphertexts multiply
//! component-wise to an encryption of the sum of their plaintexts. Messages
//! are small non-negative integers recovered by bounded discrete log.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use util::{
    algebra::{FieldElement, Group, GroupElement},
    csprng::Csprng,
};

use crate::{
    discrete_log::DiscreteLog,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
};

/// An ElGamal secret/public key pair `(s, K = g^s)`.
///
/// Secret keys below 2 are forbidden: `s = 0` produces the unit public key
/// and `s = 1` publishes the generator as the "public" key.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElGamalKeyPair {
    secret_key: FieldElement,
    public_key: GroupElement,
}

impl ElGamalKeyPair {
    /// Builds a key pair from an existing secret.
    ///
    /// Fails with [`EgError::WeakSecret`] unless `2 <= s < q`.
    pub fn from_secret(
        fixed_parameters: &FixedParameters,
        secret_key: FieldElement,
    ) -> EgResult<Self> {
        if secret_key.value() < &BigUint::from(2_u8) {
            return Err(EgError::WeakSecret);
        }
        let public_key = fixed_parameters.group().g_exp(&secret_key);
        Ok(ElGamalKeyPair {
            secret_key,
            public_key,
        })
    }

    /// Generates a fresh random key pair.
    pub fn generate(csprng: &mut Csprng, fixed_parameters: &FixedParameters) -> Self {
        loop {
            let secret_key = fixed_parameters.field().random_field_elem(csprng);
            if let Ok(keypair) = Self::from_secret(fixed_parameters, secret_key) {
                return keypair;
            }
        }
    }

    pub fn secret_key(&self) -> &FieldElement {
        &self.secret_key
    }

    pub fn public_key(&self) -> &GroupElement {
        &self.public_key
    }
}

impl Zeroize for ElGamalKeyPair {
    fn zeroize(&mut self) {
        self.secret_key.zeroize();
    }
}

impl Drop for ElGamalKeyPair {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for ElGamalKeyPair {}

impl std::fmt::Debug for ElGamalKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret key never appears in debug output.
        f.debug_struct("ElGamalKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// An ElGamal ciphertext `(pad, data) = (g^r, K^r * g^m)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ElGamalCiphertext {
    pub data: GroupElement,
    pub pad: GroupElement,
}

impl ElGamalCiphertext {
    /// The multiplicative identity `(1, 1)`: the accumulator for an empty
    /// homomorphic sum, an encryption of zero under the zero nonce.
    pub fn one() -> Self {
        ElGamalCiphertext {
            pad: Group::one(),
            data: Group::one(),
        }
    }

    /// Encrypts a small non-negative integer under the given public key.
    ///
    /// The nonce must be nonzero: a zero nonce publishes `g^m` in the clear.
    pub fn encrypt(
        fixed_parameters: &FixedParameters,
        public_key: &GroupElement,
        plaintext: u64,
        nonce: &FieldElement,
    ) -> EgResult<Self> {
        if nonce.is_zero() {
            return Err(EgError::BadNonce("encryption nonce is zero".to_owned()));
        }

        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let pad = group.g_exp(nonce);
        let g_m = group.g_exp(&FieldElement::from(plaintext, field));
        let data = public_key.exp_secret(nonce, group).mul(&g_m, group);

        Ok(ElGamalCiphertext { pad, data })
    }

    /// Computes this guardian's share of the decryption, `pad^s`.
    pub fn partial_decrypt(
        &self,
        fixed_parameters: &FixedParameters,
        secret_key: &FieldElement,
    ) -> GroupElement {
        self.pad.exp_secret(secret_key, fixed_parameters.group())
    }

    /// Recovers the plaintext given the combined decryption product
    /// `M = pad^s`: computes `g^m = data * M^-1` and searches the bounded
    /// discrete log.
    pub fn decrypt_known_product(
        &self,
        fixed_parameters: &FixedParameters,
        product: &GroupElement,
        dlog: &DiscreteLog,
        ceiling: u64,
    ) -> EgResult<u64> {
        let group = fixed_parameters.group();
        let product_inv = product.inv(group).ok_or_else(|| {
            EgError::InvalidElement("decryption share has no inverse".to_owned())
        })?;
        let g_m = self.data.mul(&product_inv, group);
        dlog.find(&g_m, ceiling)
    }

    /// Decrypts with the full secret key.
    pub fn decrypt_with_secret(
        &self,
        fixed_parameters: &FixedParameters,
        secret_key: &FieldElement,
        dlog: &DiscreteLog,
        ceiling: u64,
    ) -> EgResult<u64> {
        let product = self.partial_decrypt(fixed_parameters, secret_key);
        self.decrypt_known_product(fixed_parameters, &product, dlog, ceiling)
    }

    /// Returns true iff both components are members of the order-`q`
    /// subgroup.
    pub fn is_valid(&self, group: &Group) -> bool {
        self.pad.is_valid(group) && self.data.is_valid(group)
    }
}

/// Component-wise product of ciphertexts: the encryption of the sum of
/// their plaintexts.
pub fn elgamal_add(
    fixed_parameters: &FixedParameters,
    ciphertexts: &[&ElGamalCiphertext],
) -> EgResult<ElGamalCiphertext> {
    if ciphertexts.is_empty() {
        return Err(EgError::InvariantViolation(
            "homomorphic accumulation over an empty list".to_owned(),
        ));
    }

    let group = fixed_parameters.group();
    Ok(ciphertexts
        .iter()
        .fold(ElGamalCiphertext::one(), |acc, c| ElGamalCiphertext {
            pad: acc.pad.mul(&c.pad, group),
            data: acc.data.mul(&c.data, group),
        }))
}
