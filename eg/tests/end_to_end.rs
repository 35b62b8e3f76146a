// Copyright (C) Microsoft Corporation. All rights reserved.

//! End-to-end scenarios: key ceremony, ballot encryption, homomorphic
//! tally, and threshold decryption with and without missing guardians.

#![allow(clippy::unwrap_used)]

use num_bigint::BigUint;

use eg::{
    ballot::{
        PlaintextBallot, PlaintextBallotContest, PlaintextBallotSelection, SubmittedBallot,
    },
    context::CiphertextElectionContext,
    decryption::DecryptionMediator,
    election_record::ElectionRecord,
    encrypt::{encrypt_ballot, EncryptionDevice},
    errors::EgError,
    fixed_parameters::FixedParameters,
    guardian::Guardian,
    key_ceremony::{CeremonyDetails, ElectionJointKey, KeyCeremonyMediator},
    manifest::{example_manifest, InternalManifest},
    standard_parameters::STANDARD_PARAMETERS,
    tally::{CiphertextTally, PlaintextTally},
};
use util::csprng::Csprng;

fn toy_parameters() -> FixedParameters {
    FixedParameters::new_unchecked(
        BigUint::from(59183_u32),
        BigUint::from(127_u8),
        BigUint::from(32616_u32),
        BigUint::from(466_u32),
    )
}

/// Runs a complete honest key ceremony.
fn run_ceremony(
    fixed_parameters: &FixedParameters,
    details: CeremonyDetails,
    seed: &str,
) -> (Vec<Guardian>, ElectionJointKey) {
    let mut guardians: Vec<Guardian> = (1..=details.number_of_guardians)
        .map(|i| {
            let mut csprng = Csprng::new(format!("{seed} guardian {i}").as_bytes());
            Guardian::generate(
                &mut csprng,
                fixed_parameters,
                details,
                &format!("guardian-{i}"),
                i,
            )
            .unwrap()
        })
        .collect();

    let mut mediator = KeyCeremonyMediator::new(details).unwrap();
    for guardian in &guardians {
        mediator
            .announce(fixed_parameters, guardian.public_record())
            .unwrap();
    }
    assert!(mediator.all_public_keys_received());

    let records: Vec<_> = mediator
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

    for ix in 0..guardians.len() {
        let backups: Vec<_> = mediator
            .backups_for(guardians[ix].id())
            .into_iter()
            .cloned()
            .collect();
        for backup in backups {
            let verification = guardians[ix]
                .receive_backup(fixed_parameters, &backup)
                .unwrap();
            assert!(verification.verified);
            assert!(mediator
                .receive_verification(verification)
                .unwrap()
                .is_none());
        }
        guardians[ix].mark_backups_verified().unwrap();
    }
    assert!(mediator.all_backups_verified());

    let joint_key = mediator.publish_joint_key(fixed_parameters).unwrap();
    for guardian in guardians.iter_mut() {
        guardian.mark_joint_key_ready().unwrap();
    }
    (guardians, joint_key)
}

fn make_context(
    fixed_parameters: &FixedParameters,
    details: &CeremonyDetails,
    joint_key: &ElectionJointKey,
    manifest: &InternalManifest,
) -> CiphertextElectionContext {
    CiphertextElectionContext::make(
        fixed_parameters,
        details,
        &joint_key.joint_public_key,
        &manifest.manifest_hash(fixed_parameters),
    )
    .unwrap()
}

fn ballot_for(ballot_id: &str, selection_id: &str) -> PlaintextBallot {
    PlaintextBallot {
        contests: vec![PlaintextBallotContest {
            object_id: "contest-1".to_owned(),
            selections: vec![PlaintextBallotSelection {
                object_id: selection_id.to_owned(),
                vote: 1,
            }],
        }],
        object_id: ballot_id.to_owned(),
        style_id: "ballot-style-1".to_owned(),
    }
}

fn encrypt_and_cast(
    fixed_parameters: &FixedParameters,
    manifest: &InternalManifest,
    context: &CiphertextElectionContext,
    csprng: &mut Csprng,
    ballot: &PlaintextBallot,
) -> SubmittedBallot {
    let device = EncryptionDevice::new(1, "polling-place-1");
    let seed = device.generate_nonce_seed(fixed_parameters, csprng);
    let encrypted = encrypt_ballot(fixed_parameters, manifest, context, ballot, &seed).unwrap();
    SubmittedBallot::cast(encrypted)
}

fn selection_tally(plaintext: &PlaintextTally, selection_id: &str) -> u64 {
    plaintext.contests["contest-1"].selections[selection_id].tally
}

/// Scenario 1 + 5 + record: ten cast ballots, one spoiled ballot, all
/// guardians present, self-verifying election record. Runs on the standard
/// 4096-bit parameters.
#[test_log::test]
fn test_end_to_end_all_guardians_present() {
    let fixed_parameters: &FixedParameters = &STANDARD_PARAMETERS;
    let details = CeremonyDetails {
        number_of_guardians: 3,
        quorum: 2,
    };
    let (guardians, joint_key) = run_ceremony(fixed_parameters, details, "e2e present");

    let manifest = example_manifest(3, 1);
    let context = make_context(fixed_parameters, &details, &joint_key, &manifest);

    // 5 votes for option 1, 3 for option 2, 2 for option 3.
    let mut csprng = Csprng::new(b"e2e present ballots");
    let mut tally = CiphertextTally::new("tally-1", fixed_parameters, &manifest);
    let mut submitted = Vec::new();
    for (ix, option) in [1_u32; 5]
        .iter()
        .chain([2_u32; 3].iter())
        .chain([3_u32; 2].iter())
        .enumerate()
    {
        let ballot = ballot_for(
            &format!("ballot-{ix}"),
            &format!("selection-{option}"),
        );
        let cast = encrypt_and_cast(fixed_parameters, &manifest, &context, &mut csprng, &ballot);
        tally.append(fixed_parameters, &cast).unwrap();
        submitted.push(cast);
    }

    // One spoiled ballot for option 1; it must not enter the tally.
    let spoiled = {
        let seed = fixed_parameters.field().random_field_elem(&mut csprng);
        let encrypted = encrypt_ballot(
            fixed_parameters,
            &manifest,
            &context,
            &ballot_for("ballot-spoiled", "selection-1"),
            &seed,
        )
        .unwrap();
        SubmittedBallot::spoil(encrypted)
    };
    tally.append(fixed_parameters, &spoiled).unwrap();
    submitted.push(spoiled.clone());
    assert_eq!(tally.cast_ballot_count(), 10);

    // Every guardian contributes shares for the tally and the spoiled
    // ballot.
    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(fixed_parameters, &context, &guardian_records).unwrap();
    let mut csprng = Csprng::new(b"e2e present decryption");
    for guardian in &guardians {
        let share = guardian.compute_tally_share(&mut csprng, fixed_parameters, &tally);
        mediator
            .announce_tally_share(fixed_parameters, &tally, share)
            .unwrap();
        let ballot_share = guardian.compute_ballot_share(&mut csprng, fixed_parameters, &spoiled);
        mediator
            .announce_ballot_share(fixed_parameters, &spoiled, ballot_share)
            .unwrap();
    }

    let plaintext_tally = mediator.decrypt_tally(fixed_parameters, &tally).unwrap();
    assert_eq!(selection_tally(&plaintext_tally, "selection-1"), 5);
    assert_eq!(selection_tally(&plaintext_tally, "selection-2"), 3);
    assert_eq!(selection_tally(&plaintext_tally, "selection-3"), 2);

    let decrypted_spoiled = mediator
        .decrypt_spoiled_ballots(fixed_parameters, &tally)
        .unwrap();
    let spoiled_plaintext = &decrypted_spoiled["ballot-spoiled"];
    assert_eq!(selection_tally(spoiled_plaintext, "selection-1"), 1);
    assert_eq!(selection_tally(spoiled_plaintext, "selection-2"), 0);

    // Every submitted ballot still verifies against the record context.
    for ballot in &submitted {
        ballot
            .ballot
            .verify(fixed_parameters, &context, &manifest)
            .unwrap();
    }

    // Assemble the election record and round-trip it through canonical
    // JSON.
    let record = ElectionRecord {
        ciphertext_tally: tally,
        constants: fixed_parameters.clone(),
        context,
        decrypted_spoiled_ballots: decrypted_spoiled,
        decryption_shares: mediator.tally_shares().into_iter().cloned().collect(),
        guardian_records,
        manifest,
        plaintext_tally,
        submitted_ballots: submitted,
    };
    record.validate().unwrap();

    let mut buffer = Vec::new();
    record.to_stdiowrite(&mut buffer).unwrap();
    let parsed = ElectionRecord::from_stdioread_validated(&mut buffer.as_slice()).unwrap();
    assert_eq!(parsed, record);
}

/// Scenario 2: guardian 2 is absent at decryption; the remaining two
/// guardians reconstruct its share via Lagrange over backups.
#[test_log::test]
fn test_end_to_end_missing_guardian() {
    let fixed_parameters: &FixedParameters = &STANDARD_PARAMETERS;
    let details = CeremonyDetails {
        number_of_guardians: 3,
        quorum: 2,
    };
    let (guardians, joint_key) = run_ceremony(fixed_parameters, details, "e2e missing");

    let manifest = example_manifest(2, 1);
    let context = make_context(fixed_parameters, &details, &joint_key, &manifest);

    let mut csprng = Csprng::new(b"e2e missing ballots");
    let mut tally = CiphertextTally::new("tally-1", fixed_parameters, &manifest);
    for (ix, option) in [1_u32, 2].iter().enumerate() {
        let cast = encrypt_and_cast(
            fixed_parameters,
            &manifest,
            &context,
            &mut csprng,
            &ballot_for(&format!("ballot-{ix}"), &format!("selection-{option}")),
        );
        tally.append(fixed_parameters, &cast).unwrap();
    }

    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(fixed_parameters, &context, &guardian_records).unwrap();

    // Guardian 2 (index 1) never announces.
    let missing_record = guardians[1].public_record();
    let mut csprng = Csprng::new(b"e2e missing decryption");
    for guardian in [&guardians[0], &guardians[2]] {
        let share = guardian.compute_tally_share(&mut csprng, fixed_parameters, &tally);
        mediator
            .announce_tally_share(fixed_parameters, &tally, share)
            .unwrap();

        let compensated = guardian
            .compute_compensated_tally_share(
                &mut csprng,
                fixed_parameters,
                &missing_record,
                &tally,
            )
            .unwrap();
        mediator
            .announce_compensated_tally_share(fixed_parameters, &tally, compensated)
            .unwrap();
    }

    assert_eq!(mediator.missing_guardians().len(), 1);
    let plaintext_tally = mediator.decrypt_tally(fixed_parameters, &tally).unwrap();
    assert_eq!(selection_tally(&plaintext_tally, "selection-1"), 1);
    assert_eq!(selection_tally(&plaintext_tally, "selection-2"), 1);
}

/// Scenario 4 + quorum boundaries, on toy parameters: a quorum shortfall
/// refuses decryption outright; a quorum of one decrypts alone.
#[test_log::test]
fn test_quorum_boundaries() {
    let fixed_parameters = toy_parameters();

    // n = 5, k = 3, only 2 available.
    let details = CeremonyDetails {
        number_of_guardians: 5,
        quorum: 3,
    };
    let (guardians, joint_key) = run_ceremony(&fixed_parameters, details, "quorum shortfall");
    let manifest = example_manifest(2, 1);
    let context = make_context(&fixed_parameters, &details, &joint_key, &manifest);

    let mut csprng = Csprng::new(b"quorum shortfall ballots");
    let mut tally = CiphertextTally::new("tally-1", &fixed_parameters, &manifest);
    let cast = encrypt_and_cast(
        &fixed_parameters,
        &manifest,
        &context,
        &mut csprng,
        &ballot_for("ballot-0", "selection-1"),
    );
    tally.append(&fixed_parameters, &cast).unwrap();

    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(&fixed_parameters, &context, &guardian_records).unwrap();
    for guardian in guardians.iter().take(2) {
        let share = guardian.compute_tally_share(&mut csprng, &fixed_parameters, &tally);
        mediator
            .announce_tally_share(&fixed_parameters, &tally, share)
            .unwrap();
    }

    assert_eq!(
        mediator.decrypt_tally(&fixed_parameters, &tally),
        Err(EgError::QuorumUnmet {
            available: 2,
            quorum: 3
        })
    );

    // n = 2, k = 1: a single guardian decrypts alone (the other's share is
    // compensated).
    let details = CeremonyDetails {
        number_of_guardians: 2,
        quorum: 1,
    };
    let (guardians, joint_key) = run_ceremony(&fixed_parameters, details, "quorum of one");
    let manifest = example_manifest(2, 1);
    let context = make_context(&fixed_parameters, &details, &joint_key, &manifest);

    let mut csprng = Csprng::new(b"quorum of one ballots");
    let mut tally = CiphertextTally::new("tally-1", &fixed_parameters, &manifest);
    let cast = encrypt_and_cast(
        &fixed_parameters,
        &manifest,
        &context,
        &mut csprng,
        &ballot_for("ballot-0", "selection-2"),
    );
    tally.append(&fixed_parameters, &cast).unwrap();

    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(&fixed_parameters, &context, &guardian_records).unwrap();
    let share = guardians[0].compute_tally_share(&mut csprng, &fixed_parameters, &tally);
    mediator
        .announce_tally_share(&fixed_parameters, &tally, share)
        .unwrap();
    let compensated = guardians[0]
        .compute_compensated_tally_share(
            &mut csprng,
            &fixed_parameters,
            &guardians[1].public_record(),
            &tally,
        )
        .unwrap();
    mediator
        .announce_compensated_tally_share(&fixed_parameters, &tally, compensated)
        .unwrap();

    let plaintext_tally = mediator.decrypt_tally(&fixed_parameters, &tally).unwrap();
    assert_eq!(selection_tally(&plaintext_tally, "selection-2"), 1);
}

/// Scenario 6: a single tampered bit in a submitted ballot's data component
/// is caught by proof verification.
#[test_log::test]
fn test_tamper_detection() {
    let fixed_parameters = toy_parameters();
    let details = CeremonyDetails {
        number_of_guardians: 3,
        quorum: 2,
    };
    let (_, joint_key) = run_ceremony(&fixed_parameters, details, "tamper");
    let manifest = example_manifest(2, 1);
    let context = make_context(&fixed_parameters, &details, &joint_key, &manifest);

    let mut csprng = Csprng::new(b"tamper ballots");
    let cast = encrypt_and_cast(
        &fixed_parameters,
        &manifest,
        &context,
        &mut csprng,
        &ballot_for("ballot-0", "selection-1"),
    );

    // Untampered, the ballot verifies.
    cast.ballot
        .verify(&fixed_parameters, &context, &manifest)
        .unwrap();

    // Perturb one selection's data component.
    let mut tampered = cast.clone();
    let group = fixed_parameters.group();
    let selection = &mut tampered.ballot.contests[0].selections[0];
    selection.ciphertext.data = selection.ciphertext.data.mul(&group.generator(), group);

    assert!(tampered
        .ballot
        .verify(&fixed_parameters, &context, &manifest)
        .is_err());
}

/// The full-vote boundary: a selection carrying the whole limit leaves all
/// placeholders at zero and the record still verifies.
#[test_log::test]
fn test_vote_equals_selection_limit() {
    let fixed_parameters = toy_parameters();
    let details = CeremonyDetails {
        number_of_guardians: 3,
        quorum: 2,
    };
    let (guardians, joint_key) = run_ceremony(&fixed_parameters, details, "full limit");
    let manifest = example_manifest(2, 2);
    let context = make_context(&fixed_parameters, &details, &joint_key, &manifest);

    let ballot = PlaintextBallot {
        contests: vec![PlaintextBallotContest {
            object_id: "contest-1".to_owned(),
            selections: vec![
                PlaintextBallotSelection {
                    object_id: "selection-1".to_owned(),
                    vote: 1,
                },
                PlaintextBallotSelection {
                    object_id: "selection-2".to_owned(),
                    vote: 1,
                },
            ],
        }],
        object_id: "ballot-0".to_owned(),
        style_id: "ballot-style-1".to_owned(),
    };

    let mut csprng = Csprng::new(b"full limit ballots");
    let mut tally = CiphertextTally::new("tally-1", &fixed_parameters, &manifest);
    let cast = encrypt_and_cast(&fixed_parameters, &manifest, &context, &mut csprng, &ballot);
    cast.ballot
        .verify(&fixed_parameters, &context, &manifest)
        .unwrap();
    tally.append(&fixed_parameters, &cast).unwrap();

    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(&fixed_parameters, &context, &guardian_records).unwrap();
    for guardian in &guardians {
        let share = guardian.compute_tally_share(&mut csprng, &fixed_parameters, &tally);
        mediator
            .announce_tally_share(&fixed_parameters, &tally, share)
            .unwrap();
    }

    let plaintext_tally = mediator.decrypt_tally(&fixed_parameters, &tally).unwrap();
    assert_eq!(selection_tally(&plaintext_tally, "selection-1"), 1);
    assert_eq!(selection_tally(&plaintext_tally, "selection-2"), 1);
}

/// A share whose proof fails verification is rejected at announcement.
#[test_log::test]
fn test_bad_share_rejected() {
    let fixed_parameters = toy_parameters();
    let details = CeremonyDetails {
        number_of_guardians: 3,
        quorum: 2,
    };
    let (guardians, joint_key) = run_ceremony(&fixed_parameters, details, "bad share");
    let manifest = example_manifest(2, 1);
    let context = make_context(&fixed_parameters, &details, &joint_key, &manifest);

    let mut csprng = Csprng::new(b"bad share ballots");
    let mut tally = CiphertextTally::new("tally-1", &fixed_parameters, &manifest);
    let cast = encrypt_and_cast(
        &fixed_parameters,
        &manifest,
        &context,
        &mut csprng,
        &ballot_for("ballot-0", "selection-1"),
    );
    tally.append(&fixed_parameters, &cast).unwrap();

    let guardian_records: Vec<_> = guardians.iter().map(|g| g.public_record()).collect();
    let mut mediator =
        DecryptionMediator::new(&fixed_parameters, &context, &guardian_records).unwrap();

    let mut share = guardians[0].compute_tally_share(&mut csprng, &fixed_parameters, &tally);
    // Corrupt one selection share.
    let group = fixed_parameters.group();
    let contest = share.contests.get_mut("contest-1").unwrap();
    let selection = contest.get_mut("selection-1").unwrap();
    selection.share = selection.share.mul(&group.generator(), group);

    assert!(matches!(
        mediator.announce_tally_share(&fixed_parameters, &tally, share),
        Err(EgError::ProofVerificationFailed(_))
    ));
}
