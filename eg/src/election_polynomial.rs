// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Secret-sharing polynomials over `Z_q`.
//!
//! A guardian in a ceremony with quorum `k` samples coefficients
//! `a_0, ..., a_{k-1}`; `a_0` is its election secret. Commitments
//! `K_j = g^{a_j}` and a Schnorr proof per coefficient are published, which
//! makes every polynomial value verifiable against public data.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use util::{
    algebra::{FieldElement, Group, GroupElement},
    csprng::Csprng,
};

use crate::{fixed_parameters::FixedParameters, schnorr::SchnorrProof};

/// A secret polynomial coefficient `a_j`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretCoefficient(pub FieldElement);

impl std::fmt::Debug for SecretCoefficient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCoefficient(..)")
    }
}

/// A public commitment `K_j = g^{a_j}` to a secret coefficient.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoefficientCommitment(pub GroupElement);

/// A guardian's secret-sharing polynomial together with its public
/// commitments and per-coefficient Schnorr proofs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElectionPolynomial {
    coefficients: Vec<SecretCoefficient>,
    pub commitments: Vec<CoefficientCommitment>,
    pub proofs: Vec<SchnorrProof>,
}

impl std::fmt::Debug for ElectionPolynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectionPolynomial")
            .field("degree", &(self.coefficients.len().saturating_sub(1)))
            .field("commitments", &self.commitments)
            .finish_non_exhaustive()
    }
}

impl ElectionPolynomial {
    /// Samples a fresh polynomial of `quorum` coefficients with commitments
    /// and proofs.
    pub fn generate(
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        quorum: u32,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let coefficients: Vec<SecretCoefficient> = (0..quorum)
            .map(|_| SecretCoefficient(field.random_field_elem(csprng)))
            .collect();

        let commitments: Vec<CoefficientCommitment> = coefficients
            .iter()
            .map(|coefficient| CoefficientCommitment(group.g_exp(&coefficient.0)))
            .collect();

        let proofs: Vec<SchnorrProof> = coefficients
            .iter()
            .zip(&commitments)
            .map(|(coefficient, commitment)| {
                SchnorrProof::make(csprng, fixed_parameters, &coefficient.0, &commitment.0)
            })
            .collect();

        ElectionPolynomial {
            coefficients,
            commitments,
            proofs,
        }
    }

    /// The guardian's election secret `a_0`.
    pub fn secret(&self) -> &FieldElement {
        &self.coefficients[0].0
    }

    /// The number of coefficients, i.e. the ceremony quorum.
    pub fn quorum(&self) -> usize {
        self.coefficients.len()
    }

    /// Evaluates the polynomial at `x` by Horner's method mod `q`.
    pub fn eval(&self, fixed_parameters: &FixedParameters, x: u32) -> FieldElement {
        let field = fixed_parameters.field();
        let x = FieldElement::from(x, field);

        let mut value = util::algebra::ScalarField::zero();
        for coefficient in self.coefficients.iter().rev() {
            value = value.mul(&x, field).add(&coefficient.0, field);
        }
        value
    }
}

/// Checks a claimed polynomial value against public commitments:
/// `g^value == prod_j K_j^(x^j) (mod p)`.
pub fn verify_polynomial_value(
    fixed_parameters: &FixedParameters,
    value: &FieldElement,
    x: u32,
    commitments: &[CoefficientCommitment],
) -> bool {
    let group = fixed_parameters.group();

    let lhs = group.g_exp(value);
    let rhs = commitment_product_at(fixed_parameters, x, commitments);
    lhs == rhs
}

/// Computes `prod_j K_j^(x^j) (mod p)`, the public image `g^P(x)` of a
/// polynomial value.
pub fn commitment_product_at(
    fixed_parameters: &FixedParameters,
    x: u32,
    commitments: &[CoefficientCommitment],
) -> GroupElement {
    let field = fixed_parameters.field();
    let group = fixed_parameters.group();
    let x = FieldElement::from(x, field);

    let mut x_to_j = util::algebra::ScalarField::one();
    let mut product = Group::one();
    for commitment in commitments {
        product = product.mul(&commitment.0.exp(&x_to_j, group), group);
        x_to_j = x_to_j.mul(&x, field);
    }
    product
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;
    use util::algebra_utils::field_lagrange_at_zero;

    use crate::fixed_parameters::FixedParameters;

    fn toy_parameters() -> FixedParameters {
        FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(32616_u32),
            BigUint::from(466_u32),
        )
    }

    #[test]
    fn test_generate_commitments_and_proofs() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test polynomial generate");

        let polynomial = ElectionPolynomial::generate(&mut csprng, &fixed_parameters, 3);
        assert_eq!(polynomial.quorum(), 3);
        assert_eq!(polynomial.commitments.len(), 3);
        assert_eq!(polynomial.proofs.len(), 3);

        for proof in &polynomial.proofs {
            assert!(proof.verify(&fixed_parameters));
        }
        assert_eq!(
            polynomial.commitments[0].0,
            fixed_parameters.group().g_exp(polynomial.secret())
        );
    }

    #[test]
    fn test_eval_matches_commitments() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test polynomial eval");

        let polynomial = ElectionPolynomial::generate(&mut csprng, &fixed_parameters, 3);

        for x in 1..=5_u32 {
            let value = polynomial.eval(&fixed_parameters, x);
            assert!(verify_polynomial_value(
                &fixed_parameters,
                &value,
                x,
                &polynomial.commitments
            ));

            // A wrong value is rejected.
            let wrong = value.add(&util::algebra::ScalarField::one(), fixed_parameters.field());
            assert!(!verify_polynomial_value(
                &fixed_parameters,
                &wrong,
                x,
                &polynomial.commitments
            ));
        }
    }

    #[test]
    fn test_lagrange_recovers_secret() {
        let fixed_parameters = toy_parameters();
        let field = fixed_parameters.field();
        let mut csprng = Csprng::new(b"test polynomial lagrange");

        let polynomial = ElectionPolynomial::generate(&mut csprng, &fixed_parameters, 3);

        // Any 3 distinct points of a degree-2 polynomial recover P(0).
        let xs: Vec<FieldElement> = [2_u32, 4, 5]
            .iter()
            .map(|&x| FieldElement::from(x, field))
            .collect();
        let ys: Vec<FieldElement> = [2_u32, 4, 5]
            .iter()
            .map(|&x| polynomial.eval(&fixed_parameters, x))
            .collect();

        assert_eq!(
            field_lagrange_at_zero(&xs, &ys, field).unwrap(),
            *polynomial.secret()
        );
    }
}
