// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The election record: every public artifact a third party needs to verify
//! the election, bundled in canonical JSON.
//!
//! Struct fields are declared in lexicographic key order so that the
//! serialized object form is canonical.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    ballot::SubmittedBallot,
    context::CiphertextElectionContext,
    decryption::DecryptionShare,
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    guardian::GuardianPublicRecord,
    manifest::InternalManifest,
    tally::{CiphertextTally, PlaintextTally},
};

/// Writes any public artifact as pretty canonical JSON, covering the
/// individual file forms (`constants.json`, `context.json`,
/// `guardian_record.<id>.json`, `encrypted_ballot.<id>.json`,
/// `encrypted_tally.json`, `plaintext_tally.json`,
/// `spoiled_ballot.<id>.json`).
pub fn artifact_to_stdiowrite<T: Serialize>(
    artifact: &T,
    stdiowrite: &mut dyn std::io::Write,
) -> Result<()> {
    let mut ser = serde_json::Serializer::pretty(stdiowrite);

    artifact
        .serialize(&mut ser)
        .map_err(Into::<anyhow::Error>::into)
        .and_then(|_| ser.into_inner().write_all(b"\n").map_err(Into::into))
        .context("Writing artifact")
}

/// Reads a public artifact from its canonical JSON file form.
pub fn artifact_from_stdioread<T: serde::de::DeserializeOwned>(
    stdioread: &mut dyn std::io::Read,
) -> Result<T> {
    serde_json::from_reader(stdioread).context("Reading artifact")
}

/// The complete public record of an election.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElectionRecord {
    pub ciphertext_tally: CiphertextTally,
    pub constants: FixedParameters,
    pub context: CiphertextElectionContext,
    pub decrypted_spoiled_ballots: BTreeMap<String, PlaintextTally>,
    pub decryption_shares: Vec<DecryptionShare>,
    pub guardian_records: Vec<GuardianPublicRecord>,
    pub manifest: InternalManifest,
    pub plaintext_tally: PlaintextTally,
    pub submitted_ballots: Vec<SubmittedBallot>,
}

impl ElectionRecord {
    /// Cheap structural checks tying the pieces together. Cryptographic
    /// verification of each artifact belongs to the verifier consuming the
    /// record.
    pub fn validate(&self) -> EgResult<()> {
        self.constants.validate()?;

        if self.guardian_records.len() != self.context.number_of_guardians as usize {
            return Err(EgError::InvariantViolation(format!(
                "record holds {} guardian records for {} guardians",
                self.guardian_records.len(),
                self.context.number_of_guardians
            )));
        }

        let manifest_hash = self.manifest.manifest_hash(&self.constants);
        if manifest_hash != self.context.manifest_hash {
            return Err(EgError::InvariantViolation(
                "context manifest hash does not match the manifest".to_owned(),
            ));
        }

        for ballot in &self.submitted_ballots {
            if ballot.ballot.manifest_hash != self.context.manifest_hash {
                return Err(EgError::InvariantViolation(format!(
                    "ballot `{}` references a different manifest",
                    ballot.object_id()
                )));
            }
        }

        Ok(())
    }

    /// Reads an `ElectionRecord` from a [`std::io::Read`] and validates it.
    pub fn from_stdioread_validated(stdioread: &mut dyn std::io::Read) -> Result<Self> {
        let self_: Self =
            serde_json::from_reader(stdioread).context("Reading ElectionRecord")?;

        self_.validate()?;

        Ok(self_)
    }

    /// Writes the `ElectionRecord` to a [`std::io::Write`].
    pub fn to_stdiowrite(&self, stdiowrite: &mut dyn std::io::Write) -> Result<()> {
        let mut ser = serde_json::Serializer::pretty(stdiowrite);

        self.serialize(&mut ser)
            .map_err(Into::<anyhow::Error>::into)
            .and_then(|_| ser.into_inner().write_all(b"\n").map_err(Into::into))
            .context("Writing ElectionRecord")
    }
}
