// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The homomorphic ciphertext tally.
//!
//! Only ballots in the `Cast` state are accumulated; adding a ballot
//! multiplies its selection ciphertexts into the per-selection running
//! pairs, so the final pair encrypts the vote count. Spoiled ballots are
//! retained whole for individual decryption. Accumulation is commutative:
//! submission order never changes the tally.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use util::algebra::FieldElement;

use crate::{
    ballot::{BallotState, SubmittedBallot},
    elgamal::ElGamalCiphertext,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    manifest::InternalManifest,
};

/// The running pair `(A, B)` for one selection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextTallySelection {
    pub ciphertext: ElGamalCiphertext,
    pub description_hash: FieldElement,
    pub object_id: String,
}

/// The per-selection accumulators of one contest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextTallyContest {
    pub description_hash: FieldElement,
    pub object_id: String,
    pub selections: BTreeMap<String, CiphertextTallySelection>,
}

/// The ciphertext tally of an election.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextTally {
    pub cast_ballot_ids: BTreeSet<String>,
    pub contests: BTreeMap<String, CiphertextTallyContest>,
    pub object_id: String,
    pub spoiled_ballots: BTreeMap<String, SubmittedBallot>,
}

impl CiphertextTally {
    /// Creates an empty tally over the manifest's real (non-placeholder)
    /// selections; every accumulator starts at `(1, 1)`.
    pub fn new(
        object_id: &str,
        fixed_parameters: &FixedParameters,
        manifest: &InternalManifest,
    ) -> Self {
        let contests = manifest
            .contests
            .iter()
            .map(|contest| {
                let selections = contest
                    .selections
                    .iter()
                    .map(|selection| {
                        (
                            selection.object_id.clone(),
                            CiphertextTallySelection {
                                ciphertext: ElGamalCiphertext::one(),
                                description_hash: selection.crypto_hash(fixed_parameters),
                                object_id: selection.object_id.clone(),
                            },
                        )
                    })
                    .collect();
                (
                    contest.object_id.clone(),
                    CiphertextTallyContest {
                        description_hash: contest.crypto_hash(fixed_parameters),
                        object_id: contest.object_id.clone(),
                        selections,
                    },
                )
            })
            .collect();

        CiphertextTally {
            cast_ballot_ids: BTreeSet::new(),
            contests,
            object_id: object_id.to_owned(),
            spoiled_ballots: BTreeMap::new(),
        }
    }

    /// The number of cast ballots accumulated so far; the natural ceiling
    /// for the bounded discrete log.
    pub fn cast_ballot_count(&self) -> u64 {
        self.cast_ballot_ids.len() as u64
    }

    /// Adds a submitted ballot.
    ///
    /// Idempotence per ballot id: a second submission of the same id fails
    /// with [`EgError::DuplicateBallot`] and leaves the tally unchanged.
    /// Cast ballots accumulate; spoiled ballots are retained for individual
    /// decryption; a ballot still in the `Unknown` state is a caller bug.
    pub fn append(
        &mut self,
        fixed_parameters: &FixedParameters,
        ballot: &SubmittedBallot,
    ) -> EgResult<()> {
        let ballot_id = ballot.object_id().to_owned();
        if self.cast_ballot_ids.contains(&ballot_id)
            || self.spoiled_ballots.contains_key(&ballot_id)
        {
            return Err(EgError::DuplicateBallot(ballot_id));
        }

        match ballot.state {
            BallotState::Cast => self.accumulate(fixed_parameters, ballot)?,
            BallotState::Spoiled => {
                debug!(ballot_id = %ballot_id, "ballot spoiled, retained for decryption");
                self.spoiled_ballots.insert(ballot_id, ballot.clone());
            }
            BallotState::Unknown => {
                return Err(EgError::InvariantViolation(format!(
                    "ballot `{ballot_id}` submitted in the Unknown state"
                )));
            }
        }
        Ok(())
    }

    fn accumulate(
        &mut self,
        fixed_parameters: &FixedParameters,
        ballot: &SubmittedBallot,
    ) -> EgResult<()> {
        let group = fixed_parameters.group();
        let ballot_id = ballot.object_id().to_owned();

        // Validate the shape against the tally before mutating anything, so
        // a mismatched ballot leaves the accumulators untouched. Whether a
        // selection counts is decided by membership in the tally (built
        // from the manifest), never by the ballot's own placeholder flag.
        for contest in &ballot.ballot.contests {
            let tally_contest = self.contests.get(&contest.object_id).ok_or_else(|| {
                EgError::UnknownSelection {
                    contest_id: contest.object_id.clone(),
                    selection_id: "-".to_owned(),
                }
            })?;

            let mut seen = BTreeSet::new();
            for selection in &contest.selections {
                if !seen.insert(&selection.object_id) {
                    return Err(EgError::InvalidElement(format!(
                        "ballot `{ballot_id}` repeats selection `{}` in contest `{}`",
                        selection.object_id, contest.object_id
                    )));
                }
                if !selection.is_placeholder_selection
                    && !tally_contest.selections.contains_key(&selection.object_id)
                {
                    return Err(EgError::UnknownSelection {
                        contest_id: contest.object_id.clone(),
                        selection_id: selection.object_id.clone(),
                    });
                }
            }

            // Every tallied selection must be present on the ballot.
            for selection_id in tally_contest.selections.keys() {
                if !contest.selections.iter().any(|s| &s.object_id == selection_id) {
                    return Err(EgError::InvalidElement(format!(
                        "ballot `{ballot_id}` is missing selection `{selection_id}` of contest `{}`",
                        contest.object_id
                    )));
                }
            }
        }

        for contest in &ballot.ballot.contests {
            // Shape was validated above.
            let Some(tally_contest) = self.contests.get_mut(&contest.object_id) else {
                continue;
            };
            for selection in &contest.selections {
                let Some(tally_selection) =
                    tally_contest.selections.get_mut(&selection.object_id)
                else {
                    continue;
                };
                tally_selection.ciphertext = ElGamalCiphertext {
                    pad: tally_selection
                        .ciphertext
                        .pad
                        .mul(&selection.ciphertext.pad, group),
                    data: tally_selection
                        .ciphertext
                        .data
                        .mul(&selection.ciphertext.data, group),
                };
            }
        }

        debug!(ballot_id = %ballot_id, "ballot accumulated");
        self.cast_ballot_ids.insert(ballot_id);
        Ok(())
    }
}

/// One decrypted selection of a plaintext tally.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextTallySelection {
    pub object_id: String,
    /// The decrypted count.
    pub tally: u64,
    /// The plaintext factor `g^tally`, retained for verification.
    pub value: util::algebra::GroupElement,
}

/// One contest of a plaintext tally.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextTallyContest {
    pub object_id: String,
    pub selections: BTreeMap<String, PlaintextTallySelection>,
}

/// The decrypted tally (or the decrypted form of one spoiled ballot).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextTally {
    pub contests: BTreeMap<String, PlaintextTallyContest>,
    pub object_id: String,
}
