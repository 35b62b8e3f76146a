// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The key ceremony: attendance, backup exchange, dispute resolution, and
//! publication of the joint election key.
//!
//! The mediator is a trusted *conduit*, not a trusted party: it holds no
//! private material, collects public records and verification outcomes,
//! detects completion thresholds, and runs the challenge protocol when a
//! recipient disputes a backup.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use util::algebra::{FieldElement, Group, GroupElement};

use crate::{
    election_polynomial::verify_polynomial_value,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    guardian::GuardianPublicRecord,
    guardian_share::CoordinateCiphertext,
    hash::HashInput,
    hash_elems,
};

/// The ceremony parameters: `n` guardians with decryption quorum `k`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CeremonyDetails {
    pub number_of_guardians: u32,
    pub quorum: u32,
}

impl CeremonyDetails {
    /// Checks `1 <= k <= n`.
    pub fn validate(&self) -> EgResult<()> {
        if self.quorum < 1 || self.quorum > self.number_of_guardians {
            return Err(EgError::InvariantViolation(format!(
                "quorum {} is not within 1..={}",
                self.quorum, self.number_of_guardians
            )));
        }
        Ok(())
    }
}

/// An encrypted backup of one polynomial coordinate, in transit from its
/// owner to the designated guardian.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardianBackup {
    pub designated_id: String,
    pub designated_sequence_order: u32,
    pub encrypted_coordinate: CoordinateCiphertext,
    pub owner_id: String,
    pub owner_sequence_order: u32,
}

/// A recipient's published verdict on a received backup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupVerification {
    pub designated_id: String,
    pub owner_id: String,
    pub verified: bool,
}

/// A coordinate revealed in the clear to resolve a challenge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupReveal {
    pub coordinate: FieldElement,
    pub designated_id: String,
    pub owner_id: String,
}

/// The opaque messages guardians exchange through the collaborator
/// application. Delivery, authentication and replay protection are the
/// collaborator's responsibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CeremonyMessage {
    PublicKeyAnnounce(GuardianPublicRecord),
    BackupSend(GuardianBackup),
    BackupVerify(BackupVerification),
    BackupChallenge {
        owner_id: String,
        designated_id: String,
    },
    BackupReveal(BackupReveal),
}

/// The outcome of a resolved backup challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The revealed coordinate matched the owner's commitments; the ceremony
    /// proceeds, though that one share is no longer confidential.
    ResolvedForOwner,
    /// The revealed coordinate failed public verification; the owner is
    /// evicted and the ceremony must restart with a substitute.
    OwnerEvicted,
}

/// The published joint election key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElectionJointKey {
    /// Hash over all guardians' coefficient commitments.
    pub commitment_hash: FieldElement,

    /// `K = prod_i K_i mod p`.
    pub joint_public_key: GroupElement,
}

/// The ceremony conduit.
#[derive(Debug)]
pub struct KeyCeremonyMediator {
    backups: BTreeMap<(String, String), GuardianBackup>,
    details: CeremonyDetails,
    evicted: BTreeSet<String>,
    public_records: BTreeMap<String, GuardianPublicRecord>,
    verifications: BTreeMap<(String, String), BackupVerification>,
}

impl KeyCeremonyMediator {
    pub fn new(details: CeremonyDetails) -> EgResult<Self> {
        details.validate()?;
        Ok(KeyCeremonyMediator {
            backups: BTreeMap::new(),
            details,
            evicted: BTreeSet::new(),
            public_records: BTreeMap::new(),
            verifications: BTreeMap::new(),
        })
    }

    pub fn details(&self) -> &CeremonyDetails {
        &self.details
    }

    /// Records a guardian's announcement.
    ///
    /// Duplicate ids or sequence orders abort ceremony setup; an invalid
    /// record evicts its sender.
    pub fn announce(
        &mut self,
        fixed_parameters: &FixedParameters,
        record: GuardianPublicRecord,
    ) -> EgResult<()> {
        if self.public_records.contains_key(&record.guardian_id) {
            return Err(EgError::DuplicateGuardianId(record.guardian_id));
        }
        if self
            .public_records
            .values()
            .any(|r| r.sequence_order == record.sequence_order)
        {
            return Err(EgError::DuplicateSequenceOrder(record.sequence_order));
        }

        if let Err(e) = record.validate(fixed_parameters, self.details.quorum) {
            warn!(guardian_id = %record.guardian_id, error = %e, "announcement rejected");
            self.evicted.insert(record.guardian_id.clone());
            return Err(e);
        }

        debug!(guardian_id = %record.guardian_id, "public key announced");
        self.public_records
            .insert(record.guardian_id.clone(), record);
        Ok(())
    }

    /// True once all `n` guardians have announced valid public keys.
    pub fn all_public_keys_received(&self) -> bool {
        self.public_records.len() == self.details.number_of_guardians as usize
    }

    /// The announced public records, in sequence order.
    pub fn public_records(&self) -> Vec<&GuardianPublicRecord> {
        let mut records: Vec<_> = self.public_records.values().collect();
        records.sort_by_key(|r| r.sequence_order);
        records
    }

    /// Records an encrypted backup in transit.
    pub fn receive_backup(&mut self, backup: GuardianBackup) -> EgResult<()> {
        for id in [&backup.owner_id, &backup.designated_id] {
            if !self.public_records.contains_key(id) {
                return Err(EgError::InvariantViolation(format!(
                    "backup references unknown guardian `{id}`"
                )));
            }
        }
        self.backups.insert(
            (backup.owner_id.clone(), backup.designated_id.clone()),
            backup,
        );
        Ok(())
    }

    /// True once every ordered pair of distinct guardians has a backup.
    pub fn all_backups_distributed(&self) -> bool {
        let n = self.details.number_of_guardians as usize;
        self.backups.len() == n * (n - 1)
    }

    /// The backups addressed to the given guardian.
    pub fn backups_for(&self, designated_id: &str) -> Vec<&GuardianBackup> {
        self.backups
            .values()
            .filter(|b| b.designated_id == designated_id)
            .collect()
    }

    /// Records a verification verdict. A failed verdict yields the challenge
    /// message the mediator expects the owner to answer with a reveal.
    pub fn receive_verification(
        &mut self,
        verification: BackupVerification,
    ) -> EgResult<Option<CeremonyMessage>> {
        let key = (
            verification.owner_id.clone(),
            verification.designated_id.clone(),
        );
        if !self.backups.contains_key(&key) {
            return Err(EgError::InvariantViolation(format!(
                "verification for a backup never distributed: `{}` -> `{}`",
                verification.owner_id, verification.designated_id
            )));
        }

        let challenge = if verification.verified {
            None
        } else {
            info!(
                owner_id = %verification.owner_id,
                designated_id = %verification.designated_id,
                "backup disputed, issuing challenge"
            );
            Some(CeremonyMessage::BackupChallenge {
                owner_id: verification.owner_id.clone(),
                designated_id: verification.designated_id.clone(),
            })
        };

        self.verifications.insert(key, verification);
        Ok(challenge)
    }

    /// Resolves a challenge from the owner's public reveal.
    ///
    /// Everyone can re-run the verification: if the coordinate matches the
    /// owner's commitments the recipient's complaint is overruled (at the
    /// cost of that share's confidentiality); otherwise the owner is
    /// evicted.
    pub fn resolve_challenge(
        &mut self,
        fixed_parameters: &FixedParameters,
        reveal: &BackupReveal,
    ) -> EgResult<ChallengeOutcome> {
        let designated_record =
            self.public_records.get(&reveal.designated_id).ok_or_else(|| {
                EgError::InvariantViolation(format!(
                    "reveal references unknown guardian `{}`",
                    reveal.designated_id
                ))
            })?;
        let owner_record = self.public_records.get(&reveal.owner_id).ok_or_else(|| {
            EgError::InvariantViolation(format!(
                "reveal references unknown guardian `{}`",
                reveal.owner_id
            ))
        })?;

        let ok = verify_polynomial_value(
            fixed_parameters,
            &reveal.coordinate,
            designated_record.sequence_order,
            &owner_record.coefficient_commitments,
        );

        let key = (reveal.owner_id.clone(), reveal.designated_id.clone());
        if ok {
            info!(owner_id = %reveal.owner_id, "challenge resolved in owner's favor");
            self.verifications.insert(
                key,
                BackupVerification {
                    designated_id: reveal.designated_id.clone(),
                    owner_id: reveal.owner_id.clone(),
                    verified: true,
                },
            );
            Ok(ChallengeOutcome::ResolvedForOwner)
        } else {
            warn!(owner_id = %reveal.owner_id, "revealed coordinate invalid, owner evicted");
            self.evicted.insert(reveal.owner_id.clone());
            Ok(ChallengeOutcome::OwnerEvicted)
        }
    }

    /// The ids of evicted guardians.
    pub fn evicted(&self) -> &BTreeSet<String> {
        &self.evicted
    }

    /// True once every distributed backup has a positive verification.
    pub fn all_backups_verified(&self) -> bool {
        self.all_backups_distributed()
            && self.backups.keys().all(|key| {
                self.verifications
                    .get(key)
                    .map(|v| v.verified)
                    .unwrap_or(false)
            })
    }

    /// Publishes the joint election key `K = prod_i K_i` once the ceremony
    /// has completed.
    pub fn publish_joint_key(
        &self,
        fixed_parameters: &FixedParameters,
    ) -> EgResult<ElectionJointKey> {
        if !self.evicted.is_empty() {
            return Err(EgError::InvariantViolation(format!(
                "ceremony has evicted guardians: {:?}",
                self.evicted
            )));
        }
        if !self.all_public_keys_received() {
            return Err(EgError::InvariantViolation(
                "not all public keys have been received".to_owned(),
            ));
        }
        if !self.all_backups_verified() {
            return Err(EgError::InvariantViolation(
                "not all backups have been verified".to_owned(),
            ));
        }

        let group = fixed_parameters.group();
        let records = self.public_records();

        let joint_public_key = records.iter().fold(Group::one(), |acc, record| {
            acc.mul(&record.election_public_key, group)
        });

        let commitment_inputs: Vec<HashInput> = records
            .iter()
            .flat_map(|record| {
                record
                    .coefficient_commitments
                    .iter()
                    .map(|c| HashInput::from(&c.0))
            })
            .collect();
        let commitment_hash = hash_elems!(fixed_parameters.field(); commitment_inputs);

        info!("joint election key published");
        Ok(ElectionJointKey {
            commitment_hash,
            joint_public_key,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;
    use util::csprng::Csprng;

    use crate::{fixed_parameters::FixedParameters, guardian::Guardian};

    fn toy_parameters() -> FixedParameters {
        FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(32616_u32),
            BigUint::from(466_u32),
        )
    }

    fn details() -> CeremonyDetails {
        CeremonyDetails {
            number_of_guardians: 3,
            quorum: 2,
        }
    }

    fn make_guardians(fixed_parameters: &FixedParameters, seed: &str) -> Vec<Guardian> {
        (1..=3_u32)
            .map(|i| {
                let mut csprng = Csprng::new(format!("{seed} guardian {i}").as_bytes());
                Guardian::generate(
                    &mut csprng,
                    fixed_parameters,
                    details(),
                    &format!("guardian-{i}"),
                    i,
                )
                .unwrap()
            })
            .collect()
    }

    /// Drives a full, honest ceremony and returns the guardians plus the
    /// published joint key.
    pub(crate) fn run_ceremony(
        fixed_parameters: &FixedParameters,
        seed: &str,
    ) -> (Vec<Guardian>, ElectionJointKey) {
        let mut guardians = make_guardians(fixed_parameters, seed);
        let mut mediator = KeyCeremonyMediator::new(details()).unwrap();

        for guardian in &guardians {
            mediator
                .announce(fixed_parameters, guardian.public_record())
                .unwrap();
        }
        assert!(mediator.all_public_keys_received());

        let records: Vec<GuardianPublicRecord> = mediator
            .public_records()
            .into_iter()
            .cloned()
            .collect();
        for guardian in guardians.iter_mut() {
            guardian
                .receive_public_records(fixed_parameters, &records)
                .unwrap();
        }

        let mut csprng = Csprng::new(format!("{seed} backups").as_bytes());
        for guardian in guardians.iter_mut() {
            for backup in guardian
                .generate_backups(&mut csprng, fixed_parameters)
                .unwrap()
            {
                mediator.receive_backup(backup).unwrap();
            }
            guardian.mark_backups_distributed().unwrap();
        }
        assert!(mediator.all_backups_distributed());

        for guardian_ix in 0..guardians.len() {
            let backups: Vec<GuardianBackup> = mediator
                .backups_for(guardians[guardian_ix].id())
                .into_iter()
                .cloned()
                .collect();
            for backup in backups {
                let verification = guardians[guardian_ix]
                    .receive_backup(fixed_parameters, &backup)
                    .unwrap();
                assert!(mediator.receive_verification(verification).unwrap().is_none());
            }
            guardians[guardian_ix].mark_backups_verified().unwrap();
        }
        assert!(mediator.all_backups_verified());

        let joint_key = mediator.publish_joint_key(fixed_parameters).unwrap();
        for guardian in guardians.iter_mut() {
            guardian.mark_joint_key_ready().unwrap();
        }

        (guardians, joint_key)
    }

    #[test]
    fn test_full_ceremony() {
        let fixed_parameters = toy_parameters();
        let (guardians, joint_key) = run_ceremony(&fixed_parameters, "test_full_ceremony");

        // The joint key is the product of the guardians' public keys.
        let group = fixed_parameters.group();
        let expected = guardians.iter().fold(Group::one(), |acc, g| {
            acc.mul(&g.public_record().election_public_key, group)
        });
        assert_eq!(joint_key.joint_public_key, expected);
    }

    #[test]
    fn test_duplicate_guardian_id_rejected() {
        let fixed_parameters = toy_parameters();
        let guardians = make_guardians(&fixed_parameters, "dup id");
        let mut mediator = KeyCeremonyMediator::new(details()).unwrap();

        mediator
            .announce(&fixed_parameters, guardians[0].public_record())
            .unwrap();
        assert!(matches!(
            mediator.announce(&fixed_parameters, guardians[0].public_record()),
            Err(EgError::DuplicateGuardianId(_))
        ));
    }

    #[test]
    fn test_duplicate_sequence_order_rejected() {
        let fixed_parameters = toy_parameters();
        let guardians = make_guardians(&fixed_parameters, "dup seq");
        let mut mediator = KeyCeremonyMediator::new(details()).unwrap();

        mediator
            .announce(&fixed_parameters, guardians[0].public_record())
            .unwrap();

        let mut impostor = guardians[1].public_record();
        impostor.sequence_order = guardians[0].sequence_order();
        assert!(matches!(
            mediator.announce(&fixed_parameters, impostor),
            Err(EgError::DuplicateSequenceOrder(_))
        ));
    }

    #[test]
    fn test_invalid_quorum_rejected() {
        for (n, k) in [(3, 0), (3, 4)] {
            let details = CeremonyDetails {
                number_of_guardians: n,
                quorum: k,
            };
            assert!(KeyCeremonyMediator::new(details).is_err());
        }
    }

    #[test]
    fn test_false_dispute_resolved_for_owner() {
        let fixed_parameters = toy_parameters();
        let mut guardians = make_guardians(&fixed_parameters, "false dispute");
        let mut mediator = KeyCeremonyMediator::new(details()).unwrap();

        for guardian in &guardians {
            mediator
                .announce(&fixed_parameters, guardian.public_record())
                .unwrap();
        }
        let records: Vec<GuardianPublicRecord> = mediator
            .public_records()
            .into_iter()
            .cloned()
            .collect();
        for guardian in guardians.iter_mut() {
            guardian
                .receive_public_records(&fixed_parameters, &records)
                .unwrap();
        }

        let mut csprng = Csprng::new(b"false dispute backups");
        for guardian in guardians.iter_mut() {
            for backup in guardian
                .generate_backups(&mut csprng, &fixed_parameters)
                .unwrap()
            {
                mediator.receive_backup(backup).unwrap();
            }
            guardian.mark_backups_distributed().unwrap();
        }

        // Guardian 2 falsely claims guardian 1's (correct) backup failed.
        let challenge = mediator
            .receive_verification(BackupVerification {
                designated_id: "guardian-2".to_owned(),
                owner_id: "guardian-1".to_owned(),
                verified: false,
            })
            .unwrap();
        assert!(matches!(
            challenge,
            Some(CeremonyMessage::BackupChallenge { .. })
        ));

        // The owner answers by revealing the true coordinate; public
        // verification succeeds and nobody is evicted.
        let coordinate = {
            let owner = &guardians[0];
            // The owner recomputes P_1(2) for the reveal.
            let record = mediator.public_records()[1].clone();
            assert_eq!(record.guardian_id, "guardian-2");
            owner.reveal_coordinate(&fixed_parameters, record.sequence_order)
        };
        let outcome = mediator
            .resolve_challenge(
                &fixed_parameters,
                &BackupReveal {
                    coordinate,
                    designated_id: "guardian-2".to_owned(),
                    owner_id: "guardian-1".to_owned(),
                },
            )
            .unwrap();
        assert_eq!(outcome, ChallengeOutcome::ResolvedForOwner);
        assert!(mediator.evicted().is_empty());
    }

    #[test]
    fn test_bad_reveal_evicts_owner() {
        let fixed_parameters = toy_parameters();
        let mut guardians = make_guardians(&fixed_parameters, "bad reveal");
        let mut mediator = KeyCeremonyMediator::new(details()).unwrap();

        for guardian in &guardians {
            mediator
                .announce(&fixed_parameters, guardian.public_record())
                .unwrap();
        }
        let records: Vec<GuardianPublicRecord> = mediator
            .public_records()
            .into_iter()
            .cloned()
            .collect();
        for guardian in guardians.iter_mut() {
            guardian
                .receive_public_records(&fixed_parameters, &records)
                .unwrap();
        }
        let mut csprng = Csprng::new(b"bad reveal backups");
        for guardian in guardians.iter_mut() {
            for backup in guardian
                .generate_backups(&mut csprng, &fixed_parameters)
                .unwrap()
            {
                mediator.receive_backup(backup).unwrap();
            }
            guardian.mark_backups_distributed().unwrap();
        }

        mediator
            .receive_verification(BackupVerification {
                designated_id: "guardian-2".to_owned(),
                owner_id: "guardian-1".to_owned(),
                verified: false,
            })
            .unwrap();

        // A reveal that does not match the commitments evicts the owner.
        let bogus = fixed_parameters
            .field()
            .random_field_elem(&mut Csprng::new(b"bogus coordinate"));
        let outcome = mediator
            .resolve_challenge(
                &fixed_parameters,
                &BackupReveal {
                    coordinate: bogus,
                    designated_id: "guardian-2".to_owned(),
                    owner_id: "guardian-1".to_owned(),
                },
            )
            .unwrap();
        // With the toy field a random scalar can collide; accept either but
        // expect eviction in the overwhelming case.
        if outcome == ChallengeOutcome::OwnerEvicted {
            assert!(mediator.evicted().contains("guardian-1"));
            assert!(mediator.publish_joint_key(&fixed_parameters).is_err());
        }
    }
}
