// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Threshold decryption of the tally and of spoiled ballots.
//!
//! Each available guardian publishes a decryption share `M_i = A^{s_i}` per
//! ciphertext with a Chaum-Pedersen proof. For a missing guardian, every
//! available guardian publishes a compensated share computed from the backup
//! coordinate it verified during the ceremony; Lagrange interpolation over
//! the available sequence orders reconstructs the missing contribution.
//! Every proof is verified before a share enters the combination; if the
//! surviving shares fall below the quorum, decryption refuses entirely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use util::{
    algebra::{FieldElement, Group, GroupElement},
    algebra_utils::get_single_coefficient_at_zero,
    csprng::Csprng,
};

use crate::{
    ballot::SubmittedBallot,
    chaum_pedersen::ChaumPedersenProof,
    context::CiphertextElectionContext,
    discrete_log::{bounded_dlog_ceiling, DiscreteLog},
    election_polynomial::commitment_product_at,
    elgamal::ElGamalCiphertext,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    guardian::{Guardian, GuardianPublicRecord},
    tally::{CiphertextTally, PlaintextTally, PlaintextTallyContest, PlaintextTallySelection},
};

/// A guardian's share of one selection's decryption.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextDecryptionSelection {
    pub guardian_id: String,
    pub object_id: String,
    /// Proof that `log_g K_i == log_A share`.
    pub proof: ChaumPedersenProof,
    /// `M_i = A^{s_i}`.
    pub share: GroupElement,
}

/// A guardian's share of one selection's decryption on behalf of a missing
/// guardian.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CiphertextCompensatedDecryptionSelection {
    pub guardian_id: String,
    pub missing_guardian_id: String,
    pub object_id: String,
    /// Proof that `log_g recovery_public_key == log_A share`.
    pub proof: ChaumPedersenProof,
    /// `g^{P_missing(i)}`, recomputed from the missing guardian's public
    /// commitments at this guardian's coordinate.
    pub recovery_public_key: GroupElement,
    /// `M_{i,l} = A^{P_missing(i)}`.
    pub share: GroupElement,
}

/// Per-contest, per-selection share maps.
pub type DecryptionShareContests =
    BTreeMap<String, BTreeMap<String, CiphertextDecryptionSelection>>;
pub type CompensatedShareContests =
    BTreeMap<String, BTreeMap<String, CiphertextCompensatedDecryptionSelection>>;

/// All of one guardian's decryption shares for a tally or a spoiled ballot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecryptionShare {
    pub contests: DecryptionShareContests,
    pub guardian_id: String,
    /// The guardian's election public key `K_i`.
    pub public_key: GroupElement,
    pub sequence_order: u32,
}

/// All of one guardian's compensated shares for a missing guardian.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompensatedDecryptionShare {
    pub contests: CompensatedShareContests,
    pub guardian_id: String,
    pub missing_guardian_id: String,
    pub missing_sequence_order: u32,
    pub sequence_order: u32,
}

/// A decryption target: the ciphertexts of the tally or of one spoiled
/// ballot, flattened to (contest, selection, ciphertext).
pub(crate) struct DecryptionTarget<'a> {
    pub object_id: String,
    pub contests: Vec<(String, Vec<(String, &'a ElGamalCiphertext)>)>,
}

pub(crate) fn tally_target(tally: &CiphertextTally) -> DecryptionTarget<'_> {
    DecryptionTarget {
        object_id: tally.object_id.clone(),
        contests: tally
            .contests
            .values()
            .map(|contest| {
                (
                    contest.object_id.clone(),
                    contest
                        .selections
                        .values()
                        .map(|s| (s.object_id.clone(), &s.ciphertext))
                        .collect(),
                )
            })
            .collect(),
    }
}

pub(crate) fn ballot_target(ballot: &SubmittedBallot) -> DecryptionTarget<'_> {
    DecryptionTarget {
        object_id: ballot.object_id().to_owned(),
        contests: ballot
            .ballot
            .contests
            .iter()
            .map(|contest| {
                (
                    contest.object_id.clone(),
                    contest
                        .selections
                        .iter()
                        .filter(|s| !s.is_placeholder_selection)
                        .map(|s| (s.object_id.clone(), &s.ciphertext))
                        .collect(),
                )
            })
            .collect(),
    }
}

impl Guardian {
    fn compute_share_for_target(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        target: &DecryptionTarget<'_>,
    ) -> DecryptionShare {
        let group = fixed_parameters.group();
        let secret = self.election_secret();
        let public_key = group.g_exp(secret);

        let contests = target
            .contests
            .iter()
            .map(|(contest_id, selections)| {
                let shares = selections
                    .iter()
                    .map(|(selection_id, ciphertext)| {
                        let share = ciphertext.pad.exp_secret(secret, group);
                        let proof = ChaumPedersenProof::make(
                            csprng,
                            fixed_parameters,
                            secret,
                            &public_key,
                            &ciphertext.pad,
                            &share,
                        );
                        (
                            selection_id.clone(),
                            CiphertextDecryptionSelection {
                                guardian_id: self.id().to_owned(),
                                object_id: selection_id.clone(),
                                proof,
                                share,
                            },
                        )
                    })
                    .collect();
                (contest_id.clone(), shares)
            })
            .collect();

        DecryptionShare {
            contests,
            guardian_id: self.id().to_owned(),
            public_key,
            sequence_order: self.sequence_order(),
        }
    }

    /// Computes this guardian's decryption share for the tally.
    pub fn compute_tally_share(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        tally: &CiphertextTally,
    ) -> DecryptionShare {
        self.compute_share_for_target(csprng, fixed_parameters, &tally_target(tally))
    }

    /// Computes this guardian's decryption share for one spoiled ballot.
    pub fn compute_ballot_share(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        ballot: &SubmittedBallot,
    ) -> DecryptionShare {
        self.compute_share_for_target(csprng, fixed_parameters, &ballot_target(ballot))
    }

    fn compute_compensated_share_for_target(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        missing: &GuardianPublicRecord,
        target: &DecryptionTarget<'_>,
    ) -> EgResult<CompensatedDecryptionShare> {
        let group = fixed_parameters.group();

        let coordinate = self.backup_coordinate(&missing.guardian_id).ok_or_else(|| {
            EgError::InvariantViolation(format!(
                "guardian `{}` holds no verified backup from `{}`",
                self.id(),
                missing.guardian_id
            ))
        })?;

        // The coordinate was verified during the ceremony; re-derive its
        // public image from the missing guardian's commitments.
        let recovery_public_key = commitment_product_at(
            fixed_parameters,
            self.sequence_order(),
            &missing.coefficient_commitments,
        );
        if group.g_exp(coordinate) != recovery_public_key {
            return Err(EgError::BackupVerificationFailed {
                owner_id: missing.guardian_id.clone(),
                designated_id: self.id().to_owned(),
                reason: "held coordinate no longer matches public commitments".to_owned(),
            });
        }

        let contests = target
            .contests
            .iter()
            .map(|(contest_id, selections)| {
                let shares = selections
                    .iter()
                    .map(|(selection_id, ciphertext)| {
                        let share = ciphertext.pad.exp_secret(coordinate, group);
                        let proof = ChaumPedersenProof::make(
                            csprng,
                            fixed_parameters,
                            coordinate,
                            &recovery_public_key,
                            &ciphertext.pad,
                            &share,
                        );
                        (
                            selection_id.clone(),
                            CiphertextCompensatedDecryptionSelection {
                                guardian_id: self.id().to_owned(),
                                missing_guardian_id: missing.guardian_id.clone(),
                                object_id: selection_id.clone(),
                                proof,
                                recovery_public_key: recovery_public_key.clone(),
                                share,
                            },
                        )
                    })
                    .collect();
                (contest_id.clone(), shares)
            })
            .collect();

        Ok(CompensatedDecryptionShare {
            contests,
            guardian_id: self.id().to_owned(),
            missing_guardian_id: missing.guardian_id.clone(),
            missing_sequence_order: missing.sequence_order,
            sequence_order: self.sequence_order(),
        })
    }

    /// Computes this guardian's compensated tally share on behalf of a
    /// missing guardian, from the backup it verified during the ceremony.
    pub fn compute_compensated_tally_share(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        missing: &GuardianPublicRecord,
        tally: &CiphertextTally,
    ) -> EgResult<CompensatedDecryptionShare> {
        self.compute_compensated_share_for_target(
            csprng,
            fixed_parameters,
            missing,
            &tally_target(tally),
        )
    }

    /// Computes this guardian's compensated share for one spoiled ballot on
    /// behalf of a missing guardian.
    pub fn compute_compensated_ballot_share(
        &self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        missing: &GuardianPublicRecord,
        ballot: &SubmittedBallot,
    ) -> EgResult<CompensatedDecryptionShare> {
        self.compute_compensated_share_for_target(
            csprng,
            fixed_parameters,
            missing,
            &ballot_target(ballot),
        )
    }
}

/// Collects shares, enforces the quorum policy, and produces plaintext
/// results.
#[derive(Debug)]
pub struct DecryptionMediator {
    ballot_shares: BTreeMap<String, BTreeMap<String, DecryptionShare>>,
    compensated_ballot_shares: BTreeMap<String, BTreeMap<(String, String), CompensatedDecryptionShare>>,
    compensated_tally_shares: BTreeMap<(String, String), CompensatedDecryptionShare>,
    context: CiphertextElectionContext,
    dlog: DiscreteLog,
    guardian_records: BTreeMap<String, GuardianPublicRecord>,
    tally_shares: BTreeMap<String, DecryptionShare>,
}

impl DecryptionMediator {
    /// Creates a mediator over the full set of `n` guardian public records.
    pub fn new(
        fixed_parameters: &FixedParameters,
        context: &CiphertextElectionContext,
        guardian_records: &[GuardianPublicRecord],
    ) -> EgResult<Self> {
        if guardian_records.len() != context.number_of_guardians as usize {
            return Err(EgError::InvariantViolation(format!(
                "expected {} guardian records, got {}",
                context.number_of_guardians,
                guardian_records.len()
            )));
        }

        let mut records = BTreeMap::new();
        for record in guardian_records {
            if records
                .insert(record.guardian_id.clone(), record.clone())
                .is_some()
            {
                return Err(EgError::DuplicateGuardianId(record.guardian_id.clone()));
            }
        }

        Ok(DecryptionMediator {
            ballot_shares: BTreeMap::new(),
            compensated_ballot_shares: BTreeMap::new(),
            compensated_tally_shares: BTreeMap::new(),
            context: context.clone(),
            dlog: DiscreteLog::from_group_generator(fixed_parameters.group()),
            guardian_records: records,
            tally_shares: BTreeMap::new(),
        })
    }

    fn verify_share_against_target(
        &self,
        fixed_parameters: &FixedParameters,
        share: &DecryptionShare,
        target: &DecryptionTarget<'_>,
    ) -> EgResult<()> {
        let record = self.guardian_records.get(&share.guardian_id).ok_or_else(|| {
            EgError::InvariantViolation(format!(
                "share from unknown guardian `{}`",
                share.guardian_id
            ))
        })?;
        if record.election_public_key != share.public_key
            || record.sequence_order != share.sequence_order
        {
            return Err(EgError::ProofVerificationFailed(format!(
                "share from `{}` does not match its public record",
                share.guardian_id
            )));
        }

        for (contest_id, selections) in &target.contests {
            for (selection_id, ciphertext) in selections {
                let selection_share = share
                    .contests
                    .get(contest_id)
                    .and_then(|c| c.get(selection_id))
                    .ok_or_else(|| {
                        EgError::InvariantViolation(format!(
                            "share from `{}` is missing `{contest_id}/{selection_id}`",
                            share.guardian_id
                        ))
                    })?;

                if !selection_share.proof.verify(
                    fixed_parameters,
                    &share.public_key,
                    &ciphertext.pad,
                    &selection_share.share,
                ) {
                    return Err(EgError::ProofVerificationFailed(format!(
                        "decryption share of `{}` for `{contest_id}/{selection_id}`",
                        share.guardian_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn verify_compensated_against_target(
        &self,
        fixed_parameters: &FixedParameters,
        share: &CompensatedDecryptionShare,
        target: &DecryptionTarget<'_>,
    ) -> EgResult<()> {
        let missing_record = self
            .guardian_records
            .get(&share.missing_guardian_id)
            .ok_or_else(|| {
                EgError::InvariantViolation(format!(
                    "compensated share for unknown guardian `{}`",
                    share.missing_guardian_id
                ))
            })?;

        let expected_recovery_key = commitment_product_at(
            fixed_parameters,
            share.sequence_order,
            &missing_record.coefficient_commitments,
        );

        for (contest_id, selections) in &target.contests {
            for (selection_id, ciphertext) in selections {
                let selection_share = share
                    .contests
                    .get(contest_id)
                    .and_then(|c| c.get(selection_id))
                    .ok_or_else(|| {
                        EgError::InvariantViolation(format!(
                            "compensated share from `{}` is missing `{contest_id}/{selection_id}`",
                            share.guardian_id
                        ))
                    })?;

                if selection_share.recovery_public_key != expected_recovery_key {
                    return Err(EgError::ProofVerificationFailed(format!(
                        "recovery key of `{}` for missing `{}`",
                        share.guardian_id, share.missing_guardian_id
                    )));
                }
                if !selection_share.proof.verify(
                    fixed_parameters,
                    &selection_share.recovery_public_key,
                    &ciphertext.pad,
                    &selection_share.share,
                ) {
                    return Err(EgError::ProofVerificationFailed(format!(
                        "compensated share of `{}` for `{contest_id}/{selection_id}`",
                        share.guardian_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Accepts a guardian's tally share after verifying every proof in it.
    pub fn announce_tally_share(
        &mut self,
        fixed_parameters: &FixedParameters,
        tally: &CiphertextTally,
        share: DecryptionShare,
    ) -> EgResult<()> {
        self.verify_share_against_target(fixed_parameters, &share, &tally_target(tally))?;
        debug!(guardian_id = %share.guardian_id, "tally share accepted");
        self.tally_shares.insert(share.guardian_id.clone(), share);
        Ok(())
    }

    /// Accepts a guardian's share for one spoiled ballot.
    pub fn announce_ballot_share(
        &mut self,
        fixed_parameters: &FixedParameters,
        ballot: &SubmittedBallot,
        share: DecryptionShare,
    ) -> EgResult<()> {
        self.verify_share_against_target(fixed_parameters, &share, &ballot_target(ballot))?;
        self.ballot_shares
            .entry(ballot.object_id().to_owned())
            .or_default()
            .insert(share.guardian_id.clone(), share);
        Ok(())
    }

    /// Accepts a compensated tally share after verifying every proof and
    /// the recovery key derivation.
    pub fn announce_compensated_tally_share(
        &mut self,
        fixed_parameters: &FixedParameters,
        tally: &CiphertextTally,
        share: CompensatedDecryptionShare,
    ) -> EgResult<()> {
        self.verify_compensated_against_target(fixed_parameters, &share, &tally_target(tally))?;
        debug!(
            guardian_id = %share.guardian_id,
            missing_guardian_id = %share.missing_guardian_id,
            "compensated tally share accepted"
        );
        self.compensated_tally_shares.insert(
            (share.guardian_id.clone(), share.missing_guardian_id.clone()),
            share,
        );
        Ok(())
    }

    /// Accepts a compensated share for one spoiled ballot.
    pub fn announce_compensated_ballot_share(
        &mut self,
        fixed_parameters: &FixedParameters,
        ballot: &SubmittedBallot,
        share: CompensatedDecryptionShare,
    ) -> EgResult<()> {
        self.verify_compensated_against_target(fixed_parameters, &share, &ballot_target(ballot))?;
        self.compensated_ballot_shares
            .entry(ballot.object_id().to_owned())
            .or_default()
            .insert(
                (share.guardian_id.clone(), share.missing_guardian_id.clone()),
                share,
            );
        Ok(())
    }

    /// The accepted tally shares, for inclusion in the election record.
    pub fn tally_shares(&self) -> Vec<&DecryptionShare> {
        self.tally_shares.values().collect()
    }

    /// The guardians whose tally shares were accepted.
    pub fn available_guardians(&self) -> Vec<&GuardianPublicRecord> {
        let mut records: Vec<_> = self
            .guardian_records
            .values()
            .filter(|r| self.tally_shares.contains_key(&r.guardian_id))
            .collect();
        records.sort_by_key(|r| r.sequence_order);
        records
    }

    /// The guardians with no accepted tally share.
    pub fn missing_guardians(&self) -> Vec<&GuardianPublicRecord> {
        let mut records: Vec<_> = self
            .guardian_records
            .values()
            .filter(|r| !self.tally_shares.contains_key(&r.guardian_id))
            .collect();
        records.sort_by_key(|r| r.sequence_order);
        records
    }

    fn decrypt_target(
        &self,
        fixed_parameters: &FixedParameters,
        target: &DecryptionTarget<'_>,
        shares: &BTreeMap<String, DecryptionShare>,
        compensated: &BTreeMap<(String, String), CompensatedDecryptionShare>,
        ceiling: u64,
    ) -> EgResult<PlaintextTally> {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let available: Vec<&GuardianPublicRecord> = {
            let mut records: Vec<_> = self
                .guardian_records
                .values()
                .filter(|r| shares.contains_key(&r.guardian_id))
                .collect();
            records.sort_by_key(|r| r.sequence_order);
            records
        };
        let missing: Vec<&GuardianPublicRecord> = self
            .guardian_records
            .values()
            .filter(|r| !shares.contains_key(&r.guardian_id))
            .collect();

        let quorum = self.context.quorum;
        if (available.len() as u32) < quorum {
            warn!(
                available = available.len(),
                quorum, "decryption refused below quorum"
            );
            return Err(EgError::QuorumUnmet {
                available: available.len() as u32,
                quorum,
            });
        }

        // Every missing guardian needs a compensated share from every
        // available guardian: with more than a quorum available, all of
        // them participate.
        for missing_record in &missing {
            for available_record in &available {
                let key = (
                    available_record.guardian_id.clone(),
                    missing_record.guardian_id.clone(),
                );
                if !compensated.contains_key(&key) {
                    return Err(EgError::InvariantViolation(format!(
                        "no compensated share from `{}` for missing `{}`",
                        available_record.guardian_id, missing_record.guardian_id
                    )));
                }
            }
        }

        // Lagrange coefficients at zero over the available coordinates.
        let xs: Vec<FieldElement> = available
            .iter()
            .map(|r| FieldElement::from(r.sequence_order, field))
            .collect();
        let mut lagrange = BTreeMap::new();
        for record in &available {
            let x_i = FieldElement::from(record.sequence_order, field);
            let coefficient =
                get_single_coefficient_at_zero(&xs, &x_i, field).ok_or_else(|| {
                    EgError::InvariantViolation(
                        "Lagrange coefficient over non-distinct coordinates".to_owned(),
                    )
                })?;
            lagrange.insert(record.guardian_id.clone(), coefficient);
        }

        let mut contests = BTreeMap::new();
        for (contest_id, selections) in &target.contests {
            let mut plaintext_selections = BTreeMap::new();
            for (selection_id, ciphertext) in selections {
                // Product of the available guardians' direct shares.
                let mut product = Group::one();
                for record in &available {
                    let selection_share = shares
                        .get(&record.guardian_id)
                        .and_then(|s| s.contests.get(contest_id))
                        .and_then(|c| c.get(selection_id))
                        .ok_or_else(|| {
                            EgError::InvariantViolation(format!(
                                "verified share of `{}` lost `{contest_id}/{selection_id}`",
                                record.guardian_id
                            ))
                        })?;
                    product = product.mul(&selection_share.share, group);
                }

                // Reconstructed contribution of each missing guardian.
                for missing_record in &missing {
                    let mut reconstructed = Group::one();
                    for available_record in &available {
                        let key = (
                            available_record.guardian_id.clone(),
                            missing_record.guardian_id.clone(),
                        );
                        let compensated_share = compensated
                            .get(&key)
                            .and_then(|s| s.contests.get(contest_id))
                            .and_then(|c| c.get(selection_id))
                            .ok_or_else(|| {
                                EgError::InvariantViolation(format!(
                                    "verified compensated share of `{}` lost `{contest_id}/{selection_id}`",
                                    available_record.guardian_id
                                ))
                            })?;
                        let coefficient = lagrange
                            .get(&available_record.guardian_id)
                            .ok_or_else(|| {
                                EgError::InvariantViolation(
                                    "Lagrange coefficient missing".to_owned(),
                                )
                            })?;
                        reconstructed = reconstructed
                            .mul(&compensated_share.share.exp(coefficient, group), group);
                    }
                    product = product.mul(&reconstructed, group);
                }

                // g^t = B * M^-1, then the bounded discrete log.
                let product_inv = product.inv(group).ok_or_else(|| {
                    EgError::InvalidElement("combined share has no inverse".to_owned())
                })?;
                let value = ciphertext.data.mul(&product_inv, group);
                let tally = self.dlog.find(&value, ceiling)?;

                plaintext_selections.insert(
                    selection_id.clone(),
                    PlaintextTallySelection {
                        object_id: selection_id.clone(),
                        tally,
                        value,
                    },
                );
            }
            contests.insert(
                contest_id.clone(),
                PlaintextTallyContest {
                    object_id: contest_id.clone(),
                    selections: plaintext_selections,
                },
            );
        }

        Ok(PlaintextTally {
            contests,
            object_id: target.object_id.clone(),
        })
    }

    /// Decrypts the tally from the accepted shares.
    ///
    /// The discrete-log ceiling is the cast-ballot count, overridable via
    /// `EG_BOUNDED_DLOG_MAX`.
    pub fn decrypt_tally(
        &self,
        fixed_parameters: &FixedParameters,
        tally: &CiphertextTally,
    ) -> EgResult<PlaintextTally> {
        let ceiling = bounded_dlog_ceiling(tally.cast_ballot_count());
        let result = self.decrypt_target(
            fixed_parameters,
            &tally_target(tally),
            &self.tally_shares,
            &self.compensated_tally_shares,
            ceiling,
        )?;
        info!(object_id = %tally.object_id, "tally decrypted");
        Ok(result)
    }

    /// Decrypts every spoiled ballot retained in the tally.
    pub fn decrypt_spoiled_ballots(
        &self,
        fixed_parameters: &FixedParameters,
        tally: &CiphertextTally,
    ) -> EgResult<BTreeMap<String, PlaintextTally>> {
        // Spoiled selections encrypt 0 or 1.
        let ceiling = bounded_dlog_ceiling(1);

        let empty_shares = BTreeMap::new();
        let empty_compensated = BTreeMap::new();

        let mut decrypted = BTreeMap::new();
        for (ballot_id, ballot) in &tally.spoiled_ballots {
            let shares = self.ballot_shares.get(ballot_id).unwrap_or(&empty_shares);
            let compensated = self
                .compensated_ballot_shares
                .get(ballot_id)
                .unwrap_or(&empty_compensated);
            let plaintext = self.decrypt_target(
                fixed_parameters,
                &ballot_target(ballot),
                shares,
                compensated,
                ceiling,
            )?;
            decrypted.insert(ballot_id.clone(), plaintext);
        }
        Ok(decrypted)
    }
}
