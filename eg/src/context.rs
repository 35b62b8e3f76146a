// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The ciphertext election context: the hashes and joint key every
//! encryption and proof binds to.

use serde::{Deserialize, Serialize};

use util::{
    algebra::{FieldElement, GroupElement},
    base16::to_string_hex_bits,
};

use crate::{
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    hash_elems,
    key_ceremony::CeremonyDetails,
};

/// The public context of an election, `context.json`.
///
/// `crypto_base_hash = H(p, q, g, n, k, manifest_hash)` and
/// `crypto_extended_base_hash = H(crypto_base_hash, K)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextElectionContext {
    pub crypto_base_hash: FieldElement,
    pub crypto_extended_base_hash: FieldElement,
    pub joint_public_key: GroupElement,
    pub manifest_hash: FieldElement,
    pub number_of_guardians: u32,
    pub quorum: u32,
}

impl CiphertextElectionContext {
    /// Computes the context for a completed key ceremony.
    pub fn make(
        fixed_parameters: &FixedParameters,
        ceremony: &CeremonyDetails,
        joint_public_key: &GroupElement,
        manifest_hash: &FieldElement,
    ) -> EgResult<Self> {
        ceremony.validate()?;
        if !joint_public_key.is_valid(fixed_parameters.group()) {
            return Err(EgError::SubgroupViolation(
                "joint public key".to_owned(),
            ));
        }

        let field = fixed_parameters.field();

        // The primes enter the transcript as their fixed-width hex forms.
        let p_hex = to_string_hex_bits(fixed_parameters.group().modulus(), 4096)
            .map_err(|e| EgError::InvalidElement(e.to_string()))?;
        let q_hex = to_string_hex_bits(fixed_parameters.field().order(), 256)
            .map_err(|e| EgError::InvalidElement(e.to_string()))?;

        let crypto_base_hash = hash_elems!(
            field;
            &p_hex,
            &q_hex,
            &fixed_parameters.group().generator(),
            ceremony.number_of_guardians,
            ceremony.quorum,
            manifest_hash
        );
        let crypto_extended_base_hash = hash_elems!(field; &crypto_base_hash, joint_public_key);

        Ok(CiphertextElectionContext {
            crypto_base_hash,
            crypto_extended_base_hash,
            joint_public_key: joint_public_key.clone(),
            manifest_hash: manifest_hash.clone(),
            number_of_guardians: ceremony.number_of_guardians,
            quorum: ceremony.quorum,
        })
    }
}
