// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Schnorr proofs of knowledge of a discrete logarithm.
//!
//! A prover holding `s` with `K = g^s` commits to `U = g^u`, derives the
//! Fiat-Shamir challenge `c = H(K, U)` and responds with
//! `v = u + c * s mod q`. The verifier accepts iff `g^v == U * K^c`.

use serde::{Deserialize, Serialize};

use util::{
    algebra::{FieldElement, GroupElement},
    csprng::Csprng,
};

use crate::{fixed_parameters::FixedParameters, hash_elems};

/// A non-interactive Schnorr proof for the statement `K = g^s`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchnorrProof {
    /// Challenge `c = H(K, U)`.
    pub challenge: FieldElement,

    /// Commitment `U = g^u`.
    pub commitment: GroupElement,

    /// The public key `K` the proof speaks about.
    pub public_key: GroupElement,

    /// Response `v = u + c * s mod q`.
    pub response: FieldElement,
}

impl SchnorrProof {
    fn challenge(
        fixed_parameters: &FixedParameters,
        public_key: &GroupElement,
        commitment: &GroupElement,
    ) -> FieldElement {
        hash_elems!(fixed_parameters.field(); public_key, commitment)
    }

    /// Proves knowledge of `secret` for `public_key = g^secret` using the
    /// supplied commitment nonce `u`.
    pub fn new(
        fixed_parameters: &FixedParameters,
        secret: &FieldElement,
        public_key: &GroupElement,
        u: &FieldElement,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let commitment = group.g_exp(u);
        let challenge = Self::challenge(fixed_parameters, public_key, &commitment);
        let response = u.add(&challenge.mul(secret, field), field);

        SchnorrProof {
            public_key: public_key.clone(),
            commitment,
            challenge,
            response,
        }
    }

    /// Proves knowledge of `secret` with a freshly sampled commitment nonce.
    pub fn make(
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        secret: &FieldElement,
        public_key: &GroupElement,
    ) -> Self {
        let u = fixed_parameters.field().random_field_elem(csprng);
        Self::new(fixed_parameters, secret, public_key, &u)
    }

    /// Verifies the proof.
    pub fn verify(&self, fixed_parameters: &FixedParameters) -> bool {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        if !self.public_key.is_valid(group) || !self.commitment.is_valid(group) {
            return false;
        }
        if !self.challenge.is_valid(field) || !self.response.is_valid(field) {
            return false;
        }

        // Fiat-Shamir: the challenge must be the transcript hash.
        if self.challenge != Self::challenge(fixed_parameters, &self.public_key, &self.commitment)
        {
            return false;
        }

        // g^v == U * K^c
        let lhs = group.g_exp(&self.response);
        let rhs = self
            .commitment
            .mul(&self.public_key.exp(&self.challenge, group), group);
        lhs == rhs
    }
}
