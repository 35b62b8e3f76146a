// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Plaintext and ciphertext ballots.
//!
//! Ballot state is a tag, not a subtype: a [`SubmittedBallot`] is a
//! ciphertext ballot plus a [`BallotState`], frozen at submission time with
//! its nonces stripped.

use serde::{Deserialize, Serialize};
use strum::Display;

use util::algebra::FieldElement;

use crate::{
    chaum_pedersen::{ConstantChaumPedersenProof, DisjunctiveChaumPedersenProof},
    context::CiphertextElectionContext,
    elgamal::ElGamalCiphertext,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    hash::HashInput,
    hash_elems,
    manifest::{ContestDescription, InternalManifest, SelectionDescription},
};

/// One voter mark: the option's object id and a vote of 0 or 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallotSelection {
    pub object_id: String,
    pub vote: u64,
}

/// The voter's marks within one contest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallotContest {
    pub object_id: String,
    pub selections: Vec<PlaintextBallotSelection>,
}

/// A voter's ballot before encryption.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallot {
    pub contests: Vec<PlaintextBallotContest>,
    pub object_id: String,
    pub style_id: String,
}

/// An encrypted selection: the ciphertext, its hash, and the proof that it
/// encrypts 0 or 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextBallotSelection {
    pub ciphertext: ElGamalCiphertext,
    pub crypto_hash: FieldElement,
    pub description_hash: FieldElement,
    pub is_placeholder_selection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<FieldElement>,
    pub object_id: String,
    pub proof: DisjunctiveChaumPedersenProof,
    pub sequence_order: u32,
}

impl CiphertextBallotSelection {
    /// The selection hash: `H(object_id, description_hash, pad, data)`.
    pub fn compute_crypto_hash(
        fixed_parameters: &FixedParameters,
        object_id: &str,
        description_hash: &FieldElement,
        ciphertext: &ElGamalCiphertext,
    ) -> FieldElement {
        hash_elems!(
            fixed_parameters.field();
            object_id,
            description_hash,
            &ciphertext.pad,
            &ciphertext.data
        )
    }

    /// Re-checks this selection against the manifest description it claims
    /// to encrypt: identity, description hash, placeholder status, the hash
    /// chain, and the disjunctive proof.
    ///
    /// Everything is re-derived from `description`; none of the ballot's
    /// own fields are trusted.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        context: &CiphertextElectionContext,
        description: &SelectionDescription,
        is_placeholder_selection: bool,
    ) -> EgResult<()> {
        if self.object_id != description.object_id {
            return Err(EgError::InvalidElement(format!(
                "selection `{}` appears where the manifest places `{}`",
                self.object_id, description.object_id
            )));
        }
        if self.description_hash != description.crypto_hash(fixed_parameters) {
            return Err(EgError::InvalidElement(format!(
                "selection `{}` description hash does not match the manifest",
                self.object_id
            )));
        }
        if self.is_placeholder_selection != is_placeholder_selection {
            return Err(EgError::InvalidElement(format!(
                "selection `{}` misdeclares its placeholder status",
                self.object_id
            )));
        }

        let expected = Self::compute_crypto_hash(
            fixed_parameters,
            &self.object_id,
            &self.description_hash,
            &self.ciphertext,
        );
        if expected != self.crypto_hash {
            return Err(EgError::InvalidElement(format!(
                "selection `{}` hash mismatch",
                self.object_id
            )));
        }

        if !self.proof.verify(
            fixed_parameters,
            &context.crypto_extended_base_hash,
            &self.ciphertext,
            &context.joint_public_key,
        ) {
            return Err(EgError::ProofVerificationFailed(format!(
                "selection `{}` disjunctive proof",
                self.object_id
            )));
        }
        Ok(())
    }
}

/// An encrypted contest: its selections (placeholders included), the
/// homomorphic accumulation, and the constant proof over it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextBallotContest {
    pub ciphertext_accumulation: ElGamalCiphertext,
    pub crypto_hash: FieldElement,
    pub description_hash: FieldElement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<FieldElement>,
    pub object_id: String,
    pub proof: ConstantChaumPedersenProof,
    pub selections: Vec<CiphertextBallotSelection>,
    pub sequence_order: u32,
}

impl CiphertextBallotContest {
    /// The contest hash chains the description hash and the ordered
    /// selection hashes.
    pub fn compute_crypto_hash(
        fixed_parameters: &FixedParameters,
        description_hash: &FieldElement,
        selections: &[CiphertextBallotSelection],
    ) -> FieldElement {
        let selection_hashes: Vec<HashInput> = selections
            .iter()
            .map(|s| HashInput::from(&s.crypto_hash))
            .collect();
        hash_elems!(fixed_parameters.field(); description_hash, selection_hashes)
    }

    /// Re-checks this contest against its manifest description: the
    /// description hash, the selection layout (every real option in
    /// manifest order followed by exactly `selection_limit` placeholders),
    /// each selection, the hash chain, the accumulation, and the constant
    /// proof.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        context: &CiphertextElectionContext,
        description: &ContestDescription,
    ) -> EgResult<()> {
        if self.object_id != description.object_id {
            return Err(EgError::InvalidElement(format!(
                "contest `{}` appears where the manifest places `{}`",
                self.object_id, description.object_id
            )));
        }
        if self.description_hash != description.crypto_hash(fixed_parameters) {
            return Err(EgError::InvalidElement(format!(
                "contest `{}` description hash does not match the manifest",
                self.object_id
            )));
        }

        let real = description.selections.len();
        let placeholders = description.selection_limit as usize;
        if self.selections.len() != real + placeholders {
            return Err(EgError::InvalidElement(format!(
                "contest `{}` carries {} selections, the manifest requires {real} plus {placeholders} placeholders",
                self.object_id,
                self.selections.len()
            )));
        }
        for (selection, selection_description) in
            self.selections[..real].iter().zip(&description.selections)
        {
            selection.verify(fixed_parameters, context, selection_description, false)?;
        }
        for (j, selection) in self.selections[real..].iter().enumerate() {
            let placeholder = description.placeholder_selection(j as u32);
            selection.verify(fixed_parameters, context, &placeholder, true)?;
        }

        let expected = Self::compute_crypto_hash(
            fixed_parameters,
            &self.description_hash,
            &self.selections,
        );
        if expected != self.crypto_hash {
            return Err(EgError::InvalidElement(format!(
                "contest `{}` hash mismatch",
                self.object_id
            )));
        }

        let ciphertexts: Vec<&ElGamalCiphertext> =
            self.selections.iter().map(|s| &s.ciphertext).collect();
        let accumulation = crate::elgamal::elgamal_add(fixed_parameters, &ciphertexts)?;
        if accumulation != self.ciphertext_accumulation {
            return Err(EgError::InvalidElement(format!(
                "contest `{}` accumulation mismatch",
                self.object_id
            )));
        }

        if !self.proof.verify(
            fixed_parameters,
            &context.crypto_extended_base_hash,
            &self.ciphertext_accumulation,
            &context.joint_public_key,
            u64::from(description.selection_limit),
        ) {
            return Err(EgError::ProofVerificationFailed(format!(
                "contest `{}` constant proof",
                self.object_id
            )));
        }
        Ok(())
    }
}

/// An encrypted ballot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextBallot {
    pub contests: Vec<CiphertextBallotContest>,
    pub crypto_hash: FieldElement,
    pub manifest_hash: FieldElement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<FieldElement>,
    pub object_id: String,
    pub style_id: String,
}

impl CiphertextBallot {
    /// The ballot hash:
    /// `H(style_id, manifest_hash, H(contest_hashes...))`.
    pub fn compute_crypto_hash(
        fixed_parameters: &FixedParameters,
        style_id: &str,
        manifest_hash: &FieldElement,
        contests: &[CiphertextBallotContest],
    ) -> FieldElement {
        let field = fixed_parameters.field();
        let contest_hashes: Vec<HashInput> = contests
            .iter()
            .map(|c| HashInput::from(&c.crypto_hash))
            .collect();
        let contests_hash = hash_elems!(field; contest_hashes);
        hash_elems!(field; style_id, manifest_hash, &contests_hash)
    }

    /// Re-checks the full hash chain and every proof on the ballot against
    /// the manifest: contest and selection identities, description hashes
    /// and placeholder structure are all re-derived rather than read from
    /// the ballot.
    pub fn verify(
        &self,
        fixed_parameters: &FixedParameters,
        context: &CiphertextElectionContext,
        manifest: &InternalManifest,
    ) -> EgResult<()> {
        if self.manifest_hash != context.manifest_hash {
            return Err(EgError::InvalidElement(format!(
                "ballot `{}` was encrypted against a different manifest",
                self.object_id
            )));
        }

        let expected = Self::compute_crypto_hash(
            fixed_parameters,
            &self.style_id,
            &self.manifest_hash,
            &self.contests,
        );
        if expected != self.crypto_hash {
            return Err(EgError::InvalidElement(format!(
                "ballot `{}` hash mismatch",
                self.object_id
            )));
        }

        // The ballot must carry exactly its style's contests, in manifest
        // order; each is verified against its manifest description.
        let style_contests = manifest.contests_for_style(&self.style_id)?;
        if self.contests.len() != style_contests.len() {
            return Err(EgError::InvalidElement(format!(
                "ballot `{}` carries {} contests, its style has {}",
                self.object_id,
                self.contests.len(),
                style_contests.len()
            )));
        }
        for (contest, description) in self.contests.iter().zip(style_contests) {
            contest.verify(fixed_parameters, context, description)?;
        }
        Ok(())
    }
}

/// The submission state of a ballot.
#[derive(Clone, Copy, Debug, Display, Serialize, Deserialize, PartialEq, Eq)]
pub enum BallotState {
    Cast,
    Spoiled,
    Unknown,
}

/// A ciphertext ballot frozen by submission.
///
/// Submission strips the nonces; the state never changes afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmittedBallot {
    pub ballot: CiphertextBallot,
    pub state: BallotState,
}

impl SubmittedBallot {
    fn submit(mut ballot: CiphertextBallot, state: BallotState) -> Self {
        ballot.nonce = None;
        for contest in ballot.contests.iter_mut() {
            contest.nonce = None;
            for selection in contest.selections.iter_mut() {
                selection.nonce = None;
            }
        }
        SubmittedBallot { ballot, state }
    }

    /// Submits the ballot as cast.
    pub fn cast(ballot: CiphertextBallot) -> Self {
        Self::submit(ballot, BallotState::Cast)
    }

    /// Submits the ballot as spoiled.
    pub fn spoil(ballot: CiphertextBallot) -> Self {
        Self::submit(ballot, BallotState::Spoiled)
    }

    pub fn object_id(&self) -> &str {
        &self.ballot.object_id
    }
}
