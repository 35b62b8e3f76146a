// Copyright (C) Microsoft Corporation. All rights reserved.

#![allow(clippy::unwrap_used)]

//! Shared fixtures for in-module tests: toy parameters small enough to keep
//! exponentiation cheap, and a driver that runs an honest key ceremony.

use num_bigint::BigUint;

use util::csprng::Csprng;

use crate::{
    context::CiphertextElectionContext,
    fixed_parameters::FixedParameters,
    guardian::Guardian,
    key_ceremony::{CeremonyDetails, ElectionJointKey, KeyCeremonyMediator},
    manifest::InternalManifest,
};

/// A 16-bit toy group with a 7-bit scalar field.
pub(crate) fn toy_parameters() -> FixedParameters {
    FixedParameters::new_unchecked(
        BigUint::from(59183_u32),
        BigUint::from(127_u8),
        BigUint::from(32616_u32),
        BigUint::from(466_u32),
    )
}

/// Runs a complete honest ceremony and returns the guardians plus the joint
/// key.
pub(crate) fn run_ceremony(
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

    let records: Vec<_> = mediator.public_records().into_iter().cloned().collect();
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
            mediator.receive_verification(verification).unwrap();
        }
        guardians[ix].mark_backups_verified().unwrap();
    }

    let joint_key = mediator.publish_joint_key(fixed_parameters).unwrap();
    for guardian in guardians.iter_mut() {
        guardian.mark_joint_key_ready().unwrap();
    }
    (guardians, joint_key)
}

/// Builds the election context for a completed ceremony.
pub(crate) fn make_context(
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
