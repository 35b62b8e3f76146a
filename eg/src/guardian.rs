// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Guardians: the principals holding shares of the election secret.
//!
//! A guardian's private state never leaves this type; everything other
//! parties need travels as a [`GuardianPublicRecord`] or an encrypted backup.
//! The ceremony state machine only moves forward; verification failures land
//! in `Disputed` and resolve through the challenge protocol or eviction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, warn};

use util::{
    algebra::{FieldElement, GroupElement},
    csprng::Csprng,
};

use crate::{
    election_polynomial::{verify_polynomial_value, CoefficientCommitment, ElectionPolynomial},
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    key_ceremony::{BackupVerification, CeremonyDetails, GuardianBackup},
    schnorr::SchnorrProof,
};

/// The forward-only per-guardian ceremony state machine.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeremonyState {
    Init,
    KeysGenerated,
    PublicKeysReceived,
    BackupsGenerated,
    BackupsDistributed,
    BackupsVerified,
    JointKeyReady,
    Disputed,
    Evicted,
}

impl CeremonyState {
    fn phase_rank(self) -> Option<u8> {
        match self {
            CeremonyState::Init => Some(0),
            CeremonyState::KeysGenerated => Some(1),
            CeremonyState::PublicKeysReceived => Some(2),
            CeremonyState::BackupsGenerated => Some(3),
            CeremonyState::BackupsDistributed => Some(4),
            CeremonyState::BackupsVerified => Some(5),
            CeremonyState::JointKeyReady => Some(6),
            CeremonyState::Disputed | CeremonyState::Evicted => None,
        }
    }
}

/// A guardian's persistent public record: identity, election public key,
/// coefficient commitments, and the Schnorr proofs over them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardianPublicRecord {
    pub coefficient_commitments: Vec<CoefficientCommitment>,
    pub coefficient_proofs: Vec<SchnorrProof>,
    pub election_public_key: GroupElement,
    pub guardian_id: String,
    pub sequence_order: u32,
}

impl GuardianPublicRecord {
    /// Validates the record: positive sequence order, the expected number of
    /// commitments, subgroup membership, and every Schnorr proof.
    pub fn validate(&self, fixed_parameters: &FixedParameters, quorum: u32) -> EgResult<()> {
        let group = fixed_parameters.group();

        if self.sequence_order == 0 {
            return Err(EgError::InvalidElement(format!(
                "guardian `{}` has sequence order 0",
                self.guardian_id
            )));
        }
        if self.coefficient_commitments.len() != quorum as usize
            || self.coefficient_proofs.len() != quorum as usize
        {
            return Err(EgError::InvalidElement(format!(
                "guardian `{}` published {} commitments and {} proofs, expected {quorum}",
                self.guardian_id,
                self.coefficient_commitments.len(),
                self.coefficient_proofs.len()
            )));
        }
        if self.election_public_key != self.coefficient_commitments[0].0 {
            return Err(EgError::InvalidElement(format!(
                "guardian `{}` election public key does not match its first commitment",
                self.guardian_id
            )));
        }

        for (j, commitment) in self.coefficient_commitments.iter().enumerate() {
            if !commitment.0.is_valid(group) {
                return Err(EgError::SubgroupViolation(format!(
                    "guardian `{}` commitment {j}",
                    self.guardian_id
                )));
            }
        }
        for (j, proof) in self.coefficient_proofs.iter().enumerate() {
            if proof.public_key != self.coefficient_commitments[j].0 {
                return Err(EgError::ProofVerificationFailed(format!(
                    "guardian `{}` proof {j} speaks about a different commitment",
                    self.guardian_id
                )));
            }
            if !proof.verify(fixed_parameters) {
                return Err(EgError::ProofVerificationFailed(format!(
                    "guardian `{}` Schnorr proof {j}",
                    self.guardian_id
                )));
            }
        }

        Ok(())
    }
}

/// A guardian's private state: its polynomial, the records and backups it
/// received, and its position in the ceremony.
#[derive(Debug)]
pub struct Guardian {
    ceremony: CeremonyDetails,
    id: String,
    polynomial: ElectionPolynomial,
    /// Verified coordinates `P_owner(self)` received from other guardians,
    /// keyed by owner id.
    received_backups: BTreeMap<String, FieldElement>,
    other_records: BTreeMap<String, GuardianPublicRecord>,
    sequence_order: u32,
    state: CeremonyState,
}

impl Guardian {
    /// Creates a guardian and generates its election polynomial.
    pub fn generate(
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        ceremony: CeremonyDetails,
        id: &str,
        sequence_order: u32,
    ) -> EgResult<Self> {
        ceremony.validate()?;
        if sequence_order == 0 {
            return Err(EgError::InvalidElement(format!(
                "guardian `{id}` requires a positive sequence order"
            )));
        }

        let polynomial = ElectionPolynomial::generate(csprng, fixed_parameters, ceremony.quorum);
        debug!(guardian_id = id, sequence_order, "guardian keys generated");

        Ok(Guardian {
            ceremony,
            id: id.to_owned(),
            polynomial,
            received_backups: BTreeMap::new(),
            other_records: BTreeMap::new(),
            sequence_order,
            state: CeremonyState::KeysGenerated,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    pub fn state(&self) -> CeremonyState {
        self.state
    }

    pub fn ceremony(&self) -> &CeremonyDetails {
        &self.ceremony
    }

    /// The guardian's election secret `a_0`. Crate-private: decryption
    /// shares are computed by this crate, the secret itself is never
    /// published.
    pub(crate) fn election_secret(&self) -> &FieldElement {
        self.polynomial.secret()
    }

    /// The verified backup coordinate `P_owner(self)` received from the
    /// given guardian.
    pub(crate) fn backup_coordinate(&self, owner_id: &str) -> Option<&FieldElement> {
        self.received_backups.get(owner_id)
    }

    /// The public record of another ceremony participant, once received.
    pub fn other_record(&self, guardian_id: &str) -> Option<&GuardianPublicRecord> {
        self.other_records.get(guardian_id)
    }

    /// This guardian's public record.
    pub fn public_record(&self) -> GuardianPublicRecord {
        GuardianPublicRecord {
            coefficient_commitments: self.polynomial.commitments.clone(),
            coefficient_proofs: self.polynomial.proofs.clone(),
            election_public_key: self.polynomial.commitments[0].0.clone(),
            guardian_id: self.id.clone(),
            sequence_order: self.sequence_order,
        }
    }

    fn advance(&mut self, next: CeremonyState) -> EgResult<()> {
        let allowed = match (self.state, next) {
            // Eviction is terminal and reachable from anywhere else.
            (CeremonyState::Evicted, _) => false,
            (_, CeremonyState::Evicted) => true,
            // Disputes arise while backups are in flight and resolve back
            // into the verified state.
            (CeremonyState::BackupsDistributed, CeremonyState::Disputed) => true,
            (CeremonyState::Disputed, CeremonyState::BackupsVerified) => true,
            (from, to) => match (from.phase_rank(), to.phase_rank()) {
                (Some(a), Some(b)) => b == a + 1,
                _ => false,
            },
        };

        if !allowed {
            return Err(EgError::InvariantViolation(format!(
                "guardian `{}` cannot move from {} to {next}",
                self.id, self.state
            )));
        }
        debug!(guardian_id = %self.id, from = %self.state, to = %next, "ceremony state");
        self.state = next;
        Ok(())
    }

    /// Ingests and verifies the public records of all other participants.
    ///
    /// A record that fails validation is the sender's fault and surfaces as
    /// the corresponding error; the mediator evicts the sender.
    pub fn receive_public_records<'a>(
        &mut self,
        fixed_parameters: &FixedParameters,
        records: impl IntoIterator<Item = &'a GuardianPublicRecord>,
    ) -> EgResult<()> {
        for record in records {
            if record.guardian_id == self.id {
                continue;
            }
            record.validate(fixed_parameters, self.ceremony.quorum)?;
            if record.sequence_order == self.sequence_order {
                return Err(EgError::DuplicateSequenceOrder(record.sequence_order));
            }
            self.other_records
                .insert(record.guardian_id.clone(), record.clone());
        }

        if self.other_records.len() == (self.ceremony.number_of_guardians - 1) as usize {
            self.advance(CeremonyState::PublicKeysReceived)?;
        }
        Ok(())
    }

    /// Computes and encrypts a backup `P_self(l)` for every other guardian.
    pub fn generate_backups(
        &mut self,
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
    ) -> EgResult<Vec<GuardianBackup>> {
        if self.state != CeremonyState::PublicKeysReceived {
            return Err(EgError::InvariantViolation(format!(
                "guardian `{}` cannot generate backups in state {}",
                self.id, self.state
            )));
        }

        let backups = self
            .other_records
            .values()
            .map(|record| {
                let coordinate = self.polynomial.eval(fixed_parameters, record.sequence_order);
                let encrypted_coordinate = crate::guardian_share::CoordinateCiphertext::encrypt(
                    csprng,
                    fixed_parameters,
                    self.sequence_order,
                    record.sequence_order,
                    &record.election_public_key,
                    &coordinate,
                );
                GuardianBackup {
                    designated_id: record.guardian_id.clone(),
                    designated_sequence_order: record.sequence_order,
                    encrypted_coordinate,
                    owner_id: self.id.clone(),
                    owner_sequence_order: self.sequence_order,
                }
            })
            .collect();

        self.advance(CeremonyState::BackupsGenerated)?;
        Ok(backups)
    }

    /// Marks this guardian's backups as handed to the mediator.
    pub fn mark_backups_distributed(&mut self) -> EgResult<()> {
        self.advance(CeremonyState::BackupsDistributed)
    }

    /// Decrypts and verifies a backup addressed to this guardian.
    ///
    /// Returns the verification result to publish; `verified == false`
    /// starts the challenge protocol rather than failing the call.
    pub fn receive_backup(
        &mut self,
        fixed_parameters: &FixedParameters,
        backup: &GuardianBackup,
    ) -> EgResult<BackupVerification> {
        if backup.designated_id != self.id {
            return Err(EgError::InvariantViolation(format!(
                "guardian `{}` received a backup for `{}`",
                self.id, backup.designated_id
            )));
        }
        let owner_record = self.other_records.get(&backup.owner_id).ok_or_else(|| {
            EgError::InvariantViolation(format!(
                "guardian `{}` has no public record for `{}`",
                self.id, backup.owner_id
            ))
        })?;

        let verified = match backup.encrypted_coordinate.decrypt(
            fixed_parameters,
            backup.owner_sequence_order,
            self.sequence_order,
            self.polynomial.secret(),
        ) {
            Ok(coordinate) => {
                let ok = verify_polynomial_value(
                    fixed_parameters,
                    &coordinate,
                    self.sequence_order,
                    &owner_record.coefficient_commitments,
                );
                if ok {
                    self.received_backups
                        .insert(backup.owner_id.clone(), coordinate);
                }
                ok
            }
            Err(e) => {
                warn!(
                    guardian_id = %self.id,
                    owner_id = %backup.owner_id,
                    error = %e,
                    "backup decryption failed"
                );
                false
            }
        };

        Ok(BackupVerification {
            designated_id: self.id.clone(),
            owner_id: backup.owner_id.clone(),
            verified,
        })
    }

    /// Accepts a coordinate revealed in the clear during a challenge,
    /// after it was publicly verified against the owner's commitments.
    pub fn accept_revealed_coordinate(
        &mut self,
        fixed_parameters: &FixedParameters,
        owner_id: &str,
        coordinate: &FieldElement,
    ) -> EgResult<()> {
        let owner_record = self.other_records.get(owner_id).ok_or_else(|| {
            EgError::InvariantViolation(format!(
                "guardian `{}` has no public record for `{owner_id}`",
                self.id
            ))
        })?;

        if !verify_polynomial_value(
            fixed_parameters,
            coordinate,
            self.sequence_order,
            &owner_record.coefficient_commitments,
        ) {
            return Err(EgError::BackupVerificationFailed {
                owner_id: owner_id.to_owned(),
                designated_id: self.id.clone(),
                reason: "revealed coordinate does not match commitments".to_owned(),
            });
        }

        self.received_backups
            .insert(owner_id.to_owned(), coordinate.clone());
        Ok(())
    }

    /// Reveals the polynomial coordinate at the given sequence order in the
    /// clear, answering a backup challenge. Confidentiality of that one
    /// share is lost; the protocol accepts this.
    pub fn reveal_coordinate(
        &self,
        fixed_parameters: &FixedParameters,
        sequence_order: u32,
    ) -> FieldElement {
        self.polynomial.eval(fixed_parameters, sequence_order)
    }

    /// True once a verified backup from every other guardian is on hand.
    pub fn all_backups_received(&self) -> bool {
        self.received_backups.len() == (self.ceremony.number_of_guardians - 1) as usize
    }

    /// Marks backup verification complete.
    pub fn mark_backups_verified(&mut self) -> EgResult<()> {
        if !self.all_backups_received() {
            return Err(EgError::InvariantViolation(format!(
                "guardian `{}` is missing verified backups",
                self.id
            )));
        }
        self.advance(CeremonyState::BackupsVerified)
    }

    /// Marks this guardian as disputing a received backup.
    pub fn mark_disputed(&mut self) -> EgResult<()> {
        self.advance(CeremonyState::Disputed)
    }

    /// Marks the joint key as published.
    pub fn mark_joint_key_ready(&mut self) -> EgResult<()> {
        self.advance(CeremonyState::JointKeyReady)
    }
}
