// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The Chaum-Pedersen proof family.
//!
//! - [`ChaumPedersenProof`]: equality of discrete logs, attached to every
//!   decryption share.
//! - [`DisjunctiveChaumPedersenProof`]: a ciphertext encrypts 0 or 1,
//!   attached to every encrypted selection.
//! - [`ConstantChaumPedersenProof`]: a ciphertext encrypts a declared
//!   constant, attached to every contest accumulation.
//!
//! All are non-interactive via Fiat-Shamir; ballot-level proofs take their
//! randomness from a [`NonceSequence`] so that re-encryption with the same
//! seed reproduces them bit for bit.

use serde::{Deserialize, Serialize};

use util::{
    algebra::{FieldElement, GroupElement},
    csprng::Csprng,
};

use crate::{
    elgamal::ElGamalCiphertext,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    hash_elems,
    nonce::NonceSequence,
};

/// Proof of equality of discrete logs: `log_g K = log_A M`.
///
/// A guardian publishing the decryption share `M = A^s` proves it used the
/// same secret `s` that underlies its public key `K = g^s`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChaumPedersenProof {
    /// Challenge `c = H(K, A, M, a, b)`.
    pub challenge: FieldElement,

    /// Commitment `b = A^u`.
    pub data: GroupElement,

    /// Commitment `a = g^u`.
    pub pad: GroupElement,

    /// Response `v = u + c * s mod q`.
    pub response: FieldElement,
}

impl ChaumPedersenProof {
    fn challenge(
        fixed_parameters: &FixedParameters,
        public_key: &GroupElement,
        base: &GroupElement,
        share: &GroupElement,
        pad: &GroupElement,
        data: &GroupElement,
    ) -> FieldElement {
        hash_elems!(fixed_parameters.field(); public_key, base, share, pad, data)
    }

    /// Proves `log_g public_key == log_base share` for the secret `s`.
    pub fn make(
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        secret: &FieldElement,
        public_key: &GroupElement,
        base: &GroupElement,
        share: &GroupElement,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let u = field.random_field_elem(csprng);
        let pad = group.g_exp(&u);
        let data = base.exp_secret(&u, group);

        let challenge = Self::challenge(fixed_parameters, public_key, base, share, &pad, &data);
        let response = u.add(&challenge.mul(secret, field), field);

        ChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
        }
    }

    /// Verifies the proof against the claimed `(public_key, base, share)`.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        public_key: &GroupElement,
        base: &GroupElement,
        share: &GroupElement,
    ) -> bool {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        if !self.pad.is_valid(group) || !self.data.is_valid(group) || !share.is_valid(group) {
            return false;
        }
        if !self.challenge.is_valid(field) || !self.response.is_valid(field) {
            return false;
        }
        if self.challenge
            != Self::challenge(fixed_parameters, public_key, base, share, &self.pad, &self.data)
        {
            return false;
        }

        // g^v == a * K^c
        let lhs = group.g_exp(&self.response);
        let rhs = self.pad.mul(&public_key.exp(&self.challenge, group), group);
        if lhs != rhs {
            return false;
        }

        // A^v == b * M^c
        let lhs = base.exp(&self.response, group);
        let rhs = self.data.mul(&share.exp(&self.challenge, group), group);
        lhs == rhs
    }
}

/// Proof that an ElGamal ciphertext encrypts 0 or 1.
///
/// The branch matching the plaintext is proven honestly; the other is
/// simulated, with the two branch challenges constrained to sum to the
/// transcript hash.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisjunctiveChaumPedersenProof {
    /// Joint challenge `c`, the transcript hash.
    pub challenge: FieldElement,
    /// Branch challenge `c1`, with `c0 + c1 == c`.
    pub proof_one_challenge: FieldElement,
    /// Commitment `b1` for the one branch.
    pub proof_one_data: GroupElement,
    /// Commitment `a1` for the one branch.
    pub proof_one_pad: GroupElement,
    /// Branch response `v1`.
    pub proof_one_response: FieldElement,
    /// Branch challenge `c0`.
    pub proof_zero_challenge: FieldElement,
    /// Commitment `b0 = K^u0` for the zero branch.
    pub proof_zero_data: GroupElement,
    /// Commitment `a0 = g^u0` for the zero branch.
    pub proof_zero_pad: GroupElement,
    /// Branch response `v0`.
    pub proof_zero_response: FieldElement,
}

impl DisjunctiveChaumPedersenProof {
    #[allow(clippy::too_many_arguments)]
    fn joint_challenge(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        a0: &GroupElement,
        b0: &GroupElement,
        a1: &GroupElement,
        b1: &GroupElement,
    ) -> FieldElement {
        hash_elems!(
            fixed_parameters.field();
            extended_base_hash,
            &ciphertext.pad,
            &ciphertext.data,
            a0,
            b0,
            a1,
            b1
        )
    }

    /// Builds the proof for a ciphertext of `plaintext` (0 or 1) encrypted
    /// with `nonce` under `public_key`.
    ///
    /// All internal randomness derives from `seed`.
    pub fn new(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        nonce: &FieldElement,
        public_key: &GroupElement,
        seed: &FieldElement,
        plaintext: u64,
    ) -> EgResult<Self> {
        match plaintext {
            0 => Ok(Self::new_zero(
                fixed_parameters,
                extended_base_hash,
                ciphertext,
                nonce,
                public_key,
                seed,
            )),
            1 => Ok(Self::new_one(
                fixed_parameters,
                extended_base_hash,
                ciphertext,
                nonce,
                public_key,
                seed,
            )),
            other => Err(EgError::InvariantViolation(format!(
                "disjunctive proof requested for plaintext {other}"
            ))),
        }
    }

    fn new_zero(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        nonce: &FieldElement,
        public_key: &GroupElement,
        seed: &FieldElement,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();
        let nonces = NonceSequence::new_with_header(field, seed, "disjoint-cp");

        let u = nonces.get(field, 0);
        let c1 = nonces.get(field, 1);
        let v1 = nonces.get(field, 2);

        // Honest zero branch.
        let a0 = group.g_exp(&u);
        let b0 = public_key.exp_secret(&u, group);

        // Simulated one branch, built to satisfy the verifier's equations.
        // Inverses are taken as negated exponents, exact for subgroup
        // elements.
        let neg_c1 = c1.negate(field);
        let a1 = group
            .g_exp(&v1)
            .mul(&ciphertext.pad.exp(&neg_c1, group), group);
        let b1 = public_key
            .exp(&v1, group)
            .mul(&group.g_exp(&c1), group)
            .mul(&ciphertext.data.exp(&neg_c1, group), group);

        let challenge = Self::joint_challenge(
            fixed_parameters,
            extended_base_hash,
            ciphertext,
            &a0,
            &b0,
            &a1,
            &b1,
        );
        let c0 = challenge.sub(&c1, field);
        let v0 = u.add(&c0.mul(nonce, field), field);

        DisjunctiveChaumPedersenProof {
            proof_zero_pad: a0,
            proof_zero_data: b0,
            proof_one_pad: a1,
            proof_one_data: b1,
            proof_zero_challenge: c0,
            proof_one_challenge: c1,
            challenge,
            proof_zero_response: v0,
            proof_one_response: v1,
        }
    }

    fn new_one(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        nonce: &FieldElement,
        public_key: &GroupElement,
        seed: &FieldElement,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();
        let nonces = NonceSequence::new_with_header(field, seed, "disjoint-cp");

        let u = nonces.get(field, 0);
        let c0 = nonces.get(field, 1);
        let v0 = nonces.get(field, 2);

        // Simulated zero branch.
        let neg_c0 = c0.negate(field);
        let a0 = group
            .g_exp(&v0)
            .mul(&ciphertext.pad.exp(&neg_c0, group), group);
        let b0 = public_key
            .exp(&v0, group)
            .mul(&ciphertext.data.exp(&neg_c0, group), group);

        // Honest one branch.
        let a1 = group.g_exp(&u);
        let b1 = public_key.exp_secret(&u, group);

        let challenge = Self::joint_challenge(
            fixed_parameters,
            extended_base_hash,
            ciphertext,
            &a0,
            &b0,
            &a1,
            &b1,
        );
        let c1 = challenge.sub(&c0, field);
        let v1 = u.add(&c1.mul(nonce, field), field);

        DisjunctiveChaumPedersenProof {
            proof_zero_pad: a0,
            proof_zero_data: b0,
            proof_one_pad: a1,
            proof_one_data: b1,
            proof_zero_challenge: c0,
            proof_one_challenge: c1,
            challenge,
            proof_zero_response: v0,
            proof_one_response: v1,
        }
    }

    /// Verifies both branches and the challenge constraint.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        public_key: &GroupElement,
    ) -> bool {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        if !ciphertext.is_valid(group) {
            return false;
        }
        for commitment in [
            &self.proof_zero_pad,
            &self.proof_zero_data,
            &self.proof_one_pad,
            &self.proof_one_data,
        ] {
            if !commitment.is_valid(group) {
                return false;
            }
        }
        for scalar in [
            &self.proof_zero_challenge,
            &self.proof_one_challenge,
            &self.proof_zero_response,
            &self.proof_one_response,
        ] {
            if !scalar.is_valid(field) {
                return false;
            }
        }

        // The joint challenge is the transcript hash and splits into the
        // branch challenges.
        let expected = Self::joint_challenge(
            fixed_parameters,
            extended_base_hash,
            ciphertext,
            &self.proof_zero_pad,
            &self.proof_zero_data,
            &self.proof_one_pad,
            &self.proof_one_data,
        );
        if self.challenge != expected {
            return false;
        }
        if self
            .proof_zero_challenge
            .add(&self.proof_one_challenge, field)
            != self.challenge
        {
            return false;
        }

        // Zero branch: g^v0 == a0 * alpha^c0 and K^v0 == b0 * beta^c0.
        if group.g_exp(&self.proof_zero_response)
            != self
                .proof_zero_pad
                .mul(&ciphertext.pad.exp(&self.proof_zero_challenge, group), group)
        {
            return false;
        }
        if public_key.exp(&self.proof_zero_response, group)
            != self
                .proof_zero_data
                .mul(&ciphertext.data.exp(&self.proof_zero_challenge, group), group)
        {
            return false;
        }

        // One branch: g^v1 == a1 * alpha^c1 and K^v1 * g^c1 == b1 * beta^c1.
        if group.g_exp(&self.proof_one_response)
            != self
                .proof_one_pad
                .mul(&ciphertext.pad.exp(&self.proof_one_challenge, group), group)
        {
            return false;
        }
        let lhs = public_key
            .exp(&self.proof_one_response, group)
            .mul(&group.g_exp(&self.proof_one_challenge), group);
        let rhs = self
            .proof_one_data
            .mul(&ciphertext.data.exp(&self.proof_one_challenge, group), group);
        lhs == rhs
    }
}

/// Proof that a ciphertext encrypts the declared constant.
///
/// Attached to each contest accumulation, where the constant is the
/// selection limit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstantChaumPedersenProof {
    /// Challenge `c = H(q-bar, alpha, beta, a, b)`.
    pub challenge: FieldElement,

    /// The declared constant.
    pub constant: u64,

    /// Commitment `b = K^u`.
    pub data: GroupElement,

    /// Commitment `a = g^u`.
    pub pad: GroupElement,

    /// Response `v = u + c * r mod q` for the aggregate nonce `r`.
    pub response: FieldElement,
}

impl ConstantChaumPedersenProof {
    fn challenge_hash(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        pad: &GroupElement,
        data: &GroupElement,
    ) -> FieldElement {
        hash_elems!(
            fixed_parameters.field();
            extended_base_hash,
            &ciphertext.pad,
            &ciphertext.data,
            pad,
            data
        )
    }

    /// Builds the proof for a ciphertext of `constant` encrypted with the
    /// aggregate `nonce` under `public_key`. Randomness derives from `seed`.
    pub fn new(
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        nonce: &FieldElement,
        public_key: &GroupElement,
        seed: &FieldElement,
        constant: u64,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();
        let nonces = NonceSequence::new_with_header(field, seed, "constant-cp");

        let u = nonces.get(field, 0);
        let pad = group.g_exp(&u);
        let data = public_key.exp_secret(&u, group);

        let challenge =
            Self::challenge_hash(fixed_parameters, extended_base_hash, ciphertext, &pad, &data);
        let response = u.add(&challenge.mul(nonce, field), field);

        ConstantChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
            constant,
        }
    }

    /// Verifies the proof and that the declared constant matches the
    /// caller's expectation.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        extended_base_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
        public_key: &GroupElement,
        expected_constant: u64,
    ) -> bool {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        if self.constant != expected_constant {
            return false;
        }
        if !ciphertext.is_valid(group) || !self.pad.is_valid(group) || !self.data.is_valid(group) {
            return false;
        }
        if !self.challenge.is_valid(field) || !self.response.is_valid(field) {
            return false;
        }
        if self.challenge
            != Self::challenge_hash(
                fixed_parameters,
                extended_base_hash,
                ciphertext,
                &self.pad,
                &self.data,
            )
        {
            return false;
        }

        // g^v == a * alpha^c
        if group.g_exp(&self.response)
            != self
                .pad
                .mul(&ciphertext.pad.exp(&self.challenge, group), group)
        {
            return false;
        }

        // g^(L*c) * K^v == b * beta^c
        let l_c = FieldElement::from(self.constant, field).mul(&self.challenge, field);
        let lhs = group
            .g_exp(&l_c)
            .mul(&public_key.exp(&self.response, group), group);
        let rhs = self
            .data
            .mul(&ciphertext.data.exp(&self.challenge, group), group);
        lhs == rhs
    }
}
