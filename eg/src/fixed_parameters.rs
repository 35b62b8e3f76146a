// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The fixed cryptographic parameters `(p, q, g, r)` shared by every
//! artifact of an election.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use util::algebra::{Group, ScalarField};

use crate::errors::{EgError, EgResult};

/// The serialized form of [`FixedParameters`], `constants.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixedParametersInfo {
    /// Cofactor `r = (p - 1) / q`.
    #[serde(
        serialize_with = "util::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "util::biguint_serde::biguint_deserialize_4096_bits"
    )]
    pub cofactor: BigUint,

    /// Subgroup generator `g`.
    #[serde(
        serialize_with = "util::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "util::biguint_serde::biguint_deserialize_4096_bits"
    )]
    pub generator: BigUint,

    /// Prime modulus `p`.
    #[serde(
        serialize_with = "util::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "util::biguint_serde::biguint_deserialize_4096_bits"
    )]
    pub large_prime: BigUint,

    /// Subgroup order `q`.
    #[serde(
        serialize_with = "util::biguint_serde::biguint_serialize_256_bits",
        deserialize_with = "util::biguint_serde::biguint_deserialize_256_bits"
    )]
    pub small_prime: BigUint,
}

/// The group constants of an election.
///
/// These are process-wide immutable; interoperability depends on their exact
/// values, so [`FixedParameters::validate`] must pass before any are used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FixedParametersInfo", into = "FixedParametersInfo")]
pub struct FixedParameters {
    field: ScalarField,
    group: Group,
    cofactor: BigUint,
}

impl From<FixedParametersInfo> for FixedParameters {
    fn from(info: FixedParametersInfo) -> Self {
        FixedParameters {
            field: ScalarField::new_unchecked(info.small_prime.clone()),
            group: Group::new_unchecked(info.large_prime, info.small_prime, info.generator),
            cofactor: info.cofactor,
        }
    }
}

impl From<FixedParameters> for FixedParametersInfo {
    fn from(fp: FixedParameters) -> Self {
        FixedParametersInfo {
            cofactor: fp.cofactor.clone(),
            generator: fp.group.generator().as_biguint().clone(),
            large_prime: fp.group.modulus().clone(),
            small_prime: fp.field.order().clone(),
        }
    }
}

impl FixedParameters {
    /// Builds [`FixedParameters`] from the four constants.
    ///
    /// No validation is performed here; call [`FixedParameters::validate`].
    pub fn new_unchecked(
        large_prime: BigUint,
        small_prime: BigUint,
        generator: BigUint,
        cofactor: BigUint,
    ) -> Self {
        FixedParameters {
            field: ScalarField::new_unchecked(small_prime.clone()),
            group: Group::new_unchecked(large_prime, small_prime, generator),
            cofactor,
        }
    }

    /// The scalar field `Z_q`.
    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    /// The multiplicative subgroup of `Z_p`.
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The cofactor `r = (p - 1) / q`.
    pub fn cofactor(&self) -> &BigUint {
        &self.cofactor
    }

    /// Checks the structural relations between the constants:
    ///
    /// - `q` divides `p - 1`,
    /// - `r == (p - 1) / q`,
    /// - `1 < g < p` and `g^q == 1 (mod p)`, i.e. `g` generates the order-`q`
    ///   subgroup.
    ///
    /// Primality of `p` and `q` is pinned by the published constants and is
    /// not re-established here.
    pub fn validate(&self) -> EgResult<()> {
        let p = self.group.modulus();
        let q = self.field.order();
        let g = self.group.generator();

        if q.is_zero() || p.is_zero() {
            return Err(EgError::InvalidElement(
                "fixed parameters must be nonzero".to_owned(),
            ));
        }

        let p_minus_1 = p - BigUint::one();
        if !(&p_minus_1 % q).is_zero() {
            return Err(EgError::InvalidElement(
                "q does not divide p - 1".to_owned(),
            ));
        }
        if &p_minus_1 / q != self.cofactor {
            return Err(EgError::InvalidElement(
                "cofactor does not equal (p - 1) / q".to_owned(),
            ));
        }

        if g.as_biguint().is_one() || g.as_biguint() >= p {
            return Err(EgError::InvalidElement(
                "generator must satisfy 1 < g < p".to_owned(),
            ));
        }
        if !g.is_valid(&self.group) {
            return Err(EgError::SubgroupViolation(
                "generator does not satisfy g^q == 1 (mod p)".to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn toy_parameters() -> FixedParameters {
        FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(32616_u32),
            BigUint::from(466_u32),
        )
    }

    #[test]
    fn test_validate_toy_parameters() {
        assert!(toy_parameters().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_generator() {
        let fp = FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::one(),
            BigUint::from(466_u32),
        );
        assert!(fp.validate().is_err());

        // 12345 is not in the order-127 subgroup.
        let fp = FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(12345_u32),
            BigUint::from(466_u32),
        );
        assert!(matches!(
            fp.validate(),
            Err(EgError::SubgroupViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_cofactor() {
        let fp = FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(32616_u32),
            BigUint::from(465_u32),
        );
        assert!(fp.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let fp = toy_parameters();
        let json = serde_json::to_string(&fp).unwrap();
        let fp2: FixedParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, fp2);
    }
}
