// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Bounded discrete-log recovery with a thread-safe memoization table.
//!
//! Tallies are small non-negative integers, so `t` is recovered from `g^t`
//! by walking `g^0, g^1, ...` up to a known ceiling. The table only grows
//! and is extended under an exclusive lock, so readers never observe a
//! partially-populated entry.

use std::{collections::HashMap, sync::RwLock};

use num_bigint::BigUint;
use tracing::trace;

use util::algebra::{Group, GroupElement};

use crate::errors::{EgError, EgResult};

/// Environment variable overriding the discrete-log ceiling.
pub const EG_BOUNDED_DLOG_MAX: &str = "EG_BOUNDED_DLOG_MAX";

/// Returns the effective ceiling: `EG_BOUNDED_DLOG_MAX` if set and parseable,
/// the supplied default otherwise.
pub fn bounded_dlog_ceiling(default: u64) -> u64 {
    std::env::var(EG_BOUNDED_DLOG_MAX)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

struct DiscreteLogState {
    /// Map from `base^j` to `j` for every exponent computed so far.
    exponents: HashMap<BigUint, u64>,
    /// The largest exponent present in `exponents`.
    last_exponent: u64,
    /// `base^last_exponent`, the point the next extension continues from.
    last_element: BigUint,
}

/// Memoized powers of a fixed base.
///
/// Shared freely across threads; the sole mutable state of the crate.
pub struct DiscreteLog {
    base: BigUint,
    modulus: BigUint,
    state: RwLock<DiscreteLogState>,
}

impl std::fmt::Debug for DiscreteLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .state
            .read()
            .map(|s| s.last_exponent)
            .unwrap_or_default();
        f.debug_struct("DiscreteLog")
            .field("last_exponent", &entries)
            .finish_non_exhaustive()
    }
}

impl DiscreteLog {
    /// Creates a table for the given base, seeded with `base^0 = 1`.
    pub fn new(base: &GroupElement, group: &Group) -> Self {
        let base = base.as_biguint() % group.modulus();
        let one = BigUint::from(1_u8);

        let mut exponents = HashMap::new();
        exponents.insert(one.clone(), 0);

        DiscreteLog {
            base,
            modulus: group.modulus().clone(),
            state: RwLock::new(DiscreteLogState {
                exponents,
                last_exponent: 0,
                last_element: one,
            }),
        }
    }

    /// Creates a table over the group generator `g`.
    pub fn from_group_generator(group: &Group) -> Self {
        Self::new(&group.generator(), group)
    }

    /// Finds `t` such that `base^t == y`, searching no further than
    /// `ceiling`.
    ///
    /// Fails with [`EgError::TallyOutOfRange`] if no such `t <= ceiling`
    /// exists.
    pub fn find(&self, y: &GroupElement, ceiling: u64) -> EgResult<u64> {
        let y = y.as_biguint();

        // Fast path: the answer is already memoized.
        {
            let state = self
                .state
                .read()
                .map_err(|_| EgError::InvariantViolation("discrete log lock poisoned".to_owned()))?;
            if let Some(&t) = state.exponents.get(y) {
                if t <= ceiling {
                    return Ok(t);
                }
                return Err(EgError::TallyOutOfRange { ceiling });
            }
            if state.last_exponent >= ceiling {
                return Err(EgError::TallyOutOfRange { ceiling });
            }
        }

        // Slow path: extend the table. A writer that raced us may already
        // have passed the target, so re-check under the exclusive lock.
        let mut state = self
            .state
            .write()
            .map_err(|_| EgError::InvariantViolation("discrete log lock poisoned".to_owned()))?;
        if let Some(&t) = state.exponents.get(y) {
            if t <= ceiling {
                return Ok(t);
            }
            return Err(EgError::TallyOutOfRange { ceiling });
        }

        while state.last_exponent < ceiling {
            let next_exponent = state.last_exponent + 1;
            let next_element = &state.last_element * &self.base % &self.modulus;

            state.exponents.insert(next_element.clone(), next_exponent);
            state.last_exponent = next_exponent;
            state.last_element = next_element;

            if &state.last_element == y {
                trace!(exponent = next_exponent, "discrete log found");
                return Ok(next_exponent);
            }
        }

        Err(EgError::TallyOutOfRange { ceiling })
    }
}
