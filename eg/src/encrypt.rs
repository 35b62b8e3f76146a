// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Ballot encryption.
//!
//! Every nonce on a ballot derives deterministically from the
//! device-provided seed and the element's description hash, so an auditor
//! re-encrypting with the same seed reproduces the ciphertext ballot bit
//! for bit. Selection limits are enforced with placeholder selections: a
//! contest with limit `L` carries exactly `L` placeholders whose votes top
//! the real votes up to `L`, closed by a single constant proof over the
//! homomorphic accumulation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use util::{
    algebra::{FieldElement, ScalarField},
    csprng::Csprng,
};

use crate::{
    ballot::{
        CiphertextBallot, CiphertextBallotContest, CiphertextBallotSelection, PlaintextBallot,
        PlaintextBallotContest,
    },
    chaum_pedersen::{ConstantChaumPedersenProof, DisjunctiveChaumPedersenProof},
    context::CiphertextElectionContext,
    elgamal::{elgamal_add, ElGamalCiphertext},
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    hash_elems,
    manifest::{ContestDescription, InternalManifest, SelectionDescription},
};

/// The device performing encryption; its hash and seed pin where a ballot
/// was produced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptionDevice {
    pub device_id: u64,
    pub location: String,
}

impl EncryptionDevice {
    pub fn new(device_id: u64, location: &str) -> Self {
        EncryptionDevice {
            device_id,
            location: location.to_owned(),
        }
    }

    /// The device hash.
    pub fn crypto_hash(&self, fixed_parameters: &FixedParameters) -> FieldElement {
        hash_elems!(fixed_parameters.field(); self.device_id, &self.location)
    }

    /// Samples a fresh nonce seed bound to this device.
    pub fn generate_nonce_seed(
        &self,
        fixed_parameters: &FixedParameters,
        csprng: &mut Csprng,
    ) -> FieldElement {
        let field = fixed_parameters.field();
        let random = field.random_field_elem(csprng);
        hash_elems!(field; &self.crypto_hash(fixed_parameters), &random)
    }
}

/// The nonce of one encrypted element:
/// `H(description_hash, seed, ballot_id)` reduced mod `q`.
fn derive_nonce(
    fixed_parameters: &FixedParameters,
    description_hash: &FieldElement,
    seed: &FieldElement,
    ballot_id: &str,
) -> FieldElement {
    hash_elems!(fixed_parameters.field(); description_hash, seed, ballot_id)
}

/// Encrypts one selection (real or placeholder) with its disjunctive proof.
fn encrypt_selection(
    fixed_parameters: &FixedParameters,
    context: &CiphertextElectionContext,
    description: &SelectionDescription,
    vote: u64,
    is_placeholder_selection: bool,
    seed: &FieldElement,
    ballot_id: &str,
) -> EgResult<(CiphertextBallotSelection, FieldElement)> {
    let description_hash = description.crypto_hash(fixed_parameters);
    let nonce = derive_nonce(fixed_parameters, &description_hash, seed, ballot_id);

    let ciphertext = ElGamalCiphertext::encrypt(
        fixed_parameters,
        &context.joint_public_key,
        vote,
        &nonce,
    )?;

    let proof = DisjunctiveChaumPedersenProof::new(
        fixed_parameters,
        &context.crypto_extended_base_hash,
        &ciphertext,
        &nonce,
        &context.joint_public_key,
        &nonce,
        vote,
    )?;

    let crypto_hash = CiphertextBallotSelection::compute_crypto_hash(
        fixed_parameters,
        &description.object_id,
        &description_hash,
        &ciphertext,
    );

    Ok((
        CiphertextBallotSelection {
            ciphertext,
            crypto_hash,
            description_hash,
            is_placeholder_selection,
            nonce: Some(nonce.clone()),
            object_id: description.object_id.clone(),
            proof,
            sequence_order: description.sequence_order,
        },
        nonce,
    ))
}

/// Encrypts one contest: real selections, placeholders topping the votes up
/// to the selection limit, and the constant proof over the accumulation.
fn encrypt_contest(
    fixed_parameters: &FixedParameters,
    context: &CiphertextElectionContext,
    description: &ContestDescription,
    plaintext: Option<&PlaintextBallotContest>,
    seed: &FieldElement,
    ballot_id: &str,
) -> EgResult<CiphertextBallotContest> {
    let field = fixed_parameters.field();
    let limit = u64::from(description.selection_limit);

    // Every plaintext mark must name an option of this contest.
    if let Some(plaintext) = plaintext {
        for mark in &plaintext.selections {
            if description.selection(&mark.object_id).is_none() {
                return Err(EgError::UnknownSelection {
                    contest_id: description.object_id.clone(),
                    selection_id: mark.object_id.clone(),
                });
            }
            if mark.vote > 1 {
                return Err(EgError::OverVote {
                    contest_id: description.object_id.clone(),
                    selected: mark.vote,
                    limit,
                });
            }
        }
    }

    let vote_for = |selection_id: &str| -> u64 {
        plaintext
            .and_then(|p| {
                p.selections
                    .iter()
                    .find(|m| m.object_id == selection_id)
                    .map(|m| m.vote)
            })
            .unwrap_or(0)
    };

    let total_votes: u64 = description
        .selections
        .iter()
        .map(|s| vote_for(&s.object_id))
        .sum();
    if total_votes > limit {
        return Err(EgError::OverVote {
            contest_id: description.object_id.clone(),
            selected: total_votes,
            limit,
        });
    }

    let mut selections = Vec::with_capacity(description.selections.len() + limit as usize);
    let mut aggregate_nonce = ScalarField::zero();

    for selection_description in &description.selections {
        let (selection, nonce) = encrypt_selection(
            fixed_parameters,
            context,
            selection_description,
            vote_for(&selection_description.object_id),
            false,
            seed,
            ballot_id,
        )?;
        aggregate_nonce = aggregate_nonce.add(&nonce, field);
        selections.push(selection);
    }

    // Exactly `limit` placeholders; the first `limit - total_votes` carry a
    // one so that the contest sums to the limit.
    let ones_needed = limit - total_votes;
    for j in 0..description.selection_limit {
        let placeholder = description.placeholder_selection(j);
        let vote = u64::from(u64::from(j) < ones_needed);
        let (selection, nonce) = encrypt_selection(
            fixed_parameters,
            context,
            &placeholder,
            vote,
            true,
            seed,
            ballot_id,
        )?;
        aggregate_nonce = aggregate_nonce.add(&nonce, field);
        selections.push(selection);
    }

    let ciphertexts: Vec<&ElGamalCiphertext> = selections.iter().map(|s| &s.ciphertext).collect();
    let ciphertext_accumulation = elgamal_add(fixed_parameters, &ciphertexts)?;

    let description_hash = description.crypto_hash(fixed_parameters);
    let proof_seed = derive_nonce(fixed_parameters, &description_hash, seed, ballot_id);
    let proof = ConstantChaumPedersenProof::new(
        fixed_parameters,
        &context.crypto_extended_base_hash,
        &ciphertext_accumulation,
        &aggregate_nonce,
        &context.joint_public_key,
        &proof_seed,
        limit,
    );

    let crypto_hash = CiphertextBallotContest::compute_crypto_hash(
        fixed_parameters,
        &description_hash,
        &selections,
    );

    Ok(CiphertextBallotContest {
        ciphertext_accumulation,
        crypto_hash,
        description_hash,
        nonce: Some(proof_seed),
        object_id: description.object_id.clone(),
        proof,
        selections,
        sequence_order: description.sequence_order,
    })
}

/// Encrypts a plaintext ballot under the election context with the
/// device-provided nonce seed.
///
/// Deterministic: the same ballot, context and seed reproduce the identical
/// ciphertext ballot.
pub fn encrypt_ballot(
    fixed_parameters: &FixedParameters,
    manifest: &InternalManifest,
    context: &CiphertextElectionContext,
    ballot: &PlaintextBallot,
    nonce_seed: &FieldElement,
) -> EgResult<CiphertextBallot> {
    let style_contests = manifest.contests_for_style(&ballot.style_id)?;

    // A mark for a contest outside the ballot style is a style violation.
    for plaintext_contest in &ballot.contests {
        if !style_contests
            .iter()
            .any(|c| c.object_id == plaintext_contest.object_id)
        {
            return Err(EgError::WrongStyle(ballot.style_id.clone()));
        }
    }

    let mut contests = Vec::with_capacity(style_contests.len());
    for description in style_contests {
        let plaintext = ballot
            .contests
            .iter()
            .find(|c| c.object_id == description.object_id);
        contests.push(encrypt_contest(
            fixed_parameters,
            context,
            description,
            plaintext,
            nonce_seed,
            &ballot.object_id,
        )?);
    }

    let crypto_hash = CiphertextBallot::compute_crypto_hash(
        fixed_parameters,
        &ballot.style_id,
        &context.manifest_hash,
        &contests,
    );

    debug!(ballot_id = %ballot.object_id, "ballot encrypted");
    Ok(CiphertextBallot {
        contests,
        crypto_hash,
        manifest_hash: context.manifest_hash.clone(),
        nonce: Some(nonce_seed.clone()),
        object_id: ballot.object_id.clone(),
        style_id: ballot.style_id.clone(),
    })
}
