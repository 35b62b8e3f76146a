// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The internal election manifest: the contest and option structure ballot
//! encryption works against.
//!
//! Parsing an external manifest format is a collaborator concern; this
//! module only models the validated structure and its description hashes.

use serde::{Deserialize, Serialize};

use util::algebra::FieldElement;

use crate::{
    errors::{EgError, EgResult},
    fixed_parameters::FixedParameters,
    hash::HashInput,
    hash_elems,
};

/// A selectable option within a contest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionDescription {
    pub candidate_id: String,
    pub object_id: String,
    pub sequence_order: u32,
}

impl SelectionDescription {
    /// The description hash pinning this selection's identity.
    pub fn crypto_hash(&self, fixed_parameters: &FixedParameters) -> FieldElement {
        hash_elems!(
            fixed_parameters.field();
            &self.object_id,
            self.sequence_order,
            &self.candidate_id
        )
    }
}

/// A contest: its options and the selection limit placeholders enforce.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContestDescription {
    pub object_id: String,
    pub selection_limit: u32,
    pub selections: Vec<SelectionDescription>,
    pub sequence_order: u32,
}

impl ContestDescription {
    /// The description hash over the contest and its ordered selections.
    pub fn crypto_hash(&self, fixed_parameters: &FixedParameters) -> FieldElement {
        let field = fixed_parameters.field();
        let selection_hashes: Vec<HashInput> = self
            .selections
            .iter()
            .map(|s| HashInput::from(&s.crypto_hash(fixed_parameters)))
            .collect();
        hash_elems!(
            field;
            &self.object_id,
            self.sequence_order,
            u64::from(self.selection_limit),
            selection_hashes
        )
    }

    /// Looks up a selection by object id.
    pub fn selection(&self, selection_id: &str) -> Option<&SelectionDescription> {
        self.selections.iter().find(|s| s.object_id == selection_id)
    }

    /// The synthetic description of this contest's `j`-th placeholder
    /// selection (0-based), sequenced after the real options.
    ///
    /// Both encryption and verification derive placeholders from here, so a
    /// ballot cannot smuggle its own notion of what a placeholder is.
    pub fn placeholder_selection(&self, j: u32) -> SelectionDescription {
        let max_sequence_order = self
            .selections
            .iter()
            .map(|s| s.sequence_order)
            .max()
            .unwrap_or(0);
        SelectionDescription {
            candidate_id: String::new(),
            object_id: format!("{}-placeholder-{}", self.object_id, j + 1),
            sequence_order: max_sequence_order + j + 1,
        }
    }
}

/// A ballot style: the subset of contests a voter of that style receives.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BallotStyle {
    pub contest_ids: Vec<String>,
    pub object_id: String,
}

/// The validated internal manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalManifest {
    pub ballot_styles: Vec<BallotStyle>,
    pub contests: Vec<ContestDescription>,
    pub object_id: String,
}

impl InternalManifest {
    /// The manifest hash chaining all contest hashes and ballot style ids.
    pub fn manifest_hash(&self, fixed_parameters: &FixedParameters) -> FieldElement {
        let field = fixed_parameters.field();
        let contest_hashes: Vec<HashInput> = self
            .contests
            .iter()
            .map(|c| HashInput::from(&c.crypto_hash(fixed_parameters)))
            .collect();
        let style_ids: Vec<HashInput> = self
            .ballot_styles
            .iter()
            .map(|s| HashInput::from(&s.object_id))
            .collect();
        hash_elems!(field; &self.object_id, contest_hashes, style_ids)
    }

    /// Looks up a contest by object id.
    pub fn contest(&self, contest_id: &str) -> Option<&ContestDescription> {
        self.contests.iter().find(|c| c.object_id == contest_id)
    }

    /// The contests of a ballot style, in manifest order.
    ///
    /// Fails with [`EgError::WrongStyle`] for an unknown style id.
    pub fn contests_for_style(&self, style_id: &str) -> EgResult<Vec<&ContestDescription>> {
        let style = self
            .ballot_styles
            .iter()
            .find(|s| s.object_id == style_id)
            .ok_or_else(|| EgError::WrongStyle(style_id.to_owned()))?;

        let mut contests = Vec::with_capacity(style.contest_ids.len());
        for contest_id in &style.contest_ids {
            let contest = self.contest(contest_id).ok_or_else(|| {
                EgError::InvariantViolation(format!(
                    "ballot style `{style_id}` references unknown contest `{contest_id}`"
                ))
            })?;
            contests.push(contest);
        }
        contests.sort_by_key(|c| c.sequence_order);
        Ok(contests)
    }
}

/// A small single-contest manifest used by tests and examples.
pub fn example_manifest(option_count: u32, selection_limit: u32) -> InternalManifest {
    let selections = (0..option_count)
        .map(|i| SelectionDescription {
            candidate_id: format!("candidate-{}", i + 1),
            object_id: format!("selection-{}", i + 1),
            sequence_order: i + 1,
        })
        .collect();

    InternalManifest {
        ballot_styles: vec![BallotStyle {
            contest_ids: vec!["contest-1".to_owned()],
            object_id: "ballot-style-1".to_owned(),
        }],
        contests: vec![ContestDescription {
            object_id: "contest-1".to_owned(),
            selection_limit,
            selections,
            sequence_order: 1,
        }],
        object_id: "example-manifest".to_owned(),
    }
}
