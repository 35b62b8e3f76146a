// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The error type shared across the crate.
//!
//! Every operation that can fail on adversarial input returns an [`EgError`];
//! errors are surfaced to the caller, never swallowed. An
//! [`EgError::InvariantViolation`] indicates a bug in this crate, not bad
//! input, and aborts the operation that detected it.

/// The main [`std::error::Error`] type returned by functions of the `eg`
/// crate.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum EgError {
    #[error("Value is not a canonical element: {0}")]
    InvalidElement(String),

    #[error("Element is not a member of the order-q subgroup: {0}")]
    SubgroupViolation(String),

    #[error("ElGamal secret keys must satisfy 2 <= s < q.")]
    WeakSecret,

    #[error("Encryption nonce is unusable: {0}")]
    BadNonce(String),

    #[error("Selection `{selection_id}` does not exist in contest `{contest_id}`.")]
    UnknownSelection {
        contest_id: String,
        selection_id: String,
    },

    #[error(
        "Contest `{contest_id}` selects {selected} options but its selection limit is {limit}."
    )]
    OverVote {
        contest_id: String,
        selected: u64,
        limit: u64,
    },

    #[error("Ballot does not conform to ballot style `{0}`.")]
    WrongStyle(String),

    #[error("Proof verification failed: {0}")]
    ProofVerificationFailed(String),

    #[error("Backup from guardian `{owner_id}` for guardian `{designated_id}` failed verification: {reason}")]
    BackupVerificationFailed {
        owner_id: String,
        designated_id: String,
        reason: String,
    },

    #[error("Guardian sequence order {0} is already in use.")]
    DuplicateSequenceOrder(u32),

    #[error("Guardian id `{0}` is already in use.")]
    DuplicateGuardianId(String),

    #[error("Only {available} guardians are available, but decryption requires a quorum of {quorum}.")]
    QuorumUnmet { available: u32, quorum: u32 },

    #[error("Ballot `{0}` was already added to the tally.")]
    DuplicateBallot(String),

    #[error("No discrete log found below the ceiling of {ceiling}.")]
    TallyOutOfRange { ceiling: u64 },

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// [`Result`](std::result::Result) type with an [`EgError`].
pub type EgResult<T> = Result<T, EgError>;
