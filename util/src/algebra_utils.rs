// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Utility functions over field and group elements: byte encodings, modular
//! inverses, and Lagrange interpolation at zero.

use std::{borrow::Borrow, iter::zip, mem};

use itertools::Itertools;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};

use crate::algebra::{FieldElement, Group, GroupElement, ScalarField};

/// Returns the number of bits required to encode the given number.
pub fn cnt_bits_repr<T: Borrow<BigUint>>(n: &T) -> usize {
    let n: &BigUint = n.borrow();
    if n.is_zero() {
        1
    } else {
        n.bits() as usize
    }
}

/// Encodes a [`BigUint`] in big-endian as a left-padded byte string of length
/// at least `len`.
pub fn to_be_bytes_left_pad<T: Borrow<BigUint>>(n: &T, len: usize) -> Vec<u8> {
    let n: &BigUint = n.borrow();

    let mut v = n.to_bytes_be();
    if v.len() < len {
        let left_pad = len - v.len();
        v.reserve(left_pad);
        v.extend(std::iter::repeat(0).take(left_pad));
        v.rotate_right(left_pad);
    }

    v
}

/// Computes the inverse of `a_u` modulo `m_u` via the extended Euclidean
/// algorithm.
///
/// Returns `Some` iff `gcd(a_u, m_u) == 1`.
pub fn mod_inverse(a_u: &BigUint, m_u: &BigUint) -> Option<BigUint> {
    if m_u.is_zero() {
        return None;
    }
    let m = BigInt::from_biguint(Sign::Plus, m_u.clone());
    let mut t = (BigInt::zero(), BigInt::one());
    let mut r = (m.clone(), BigInt::from_biguint(Sign::Plus, a_u.clone()));
    while !r.1.is_zero() {
        let q = &r.0 / &r.1;
        let step = |mut pair: (BigInt, BigInt)| {
            mem::swap(&mut pair.0, &mut pair.1);
            pair.1 -= &q * &pair.0;
            pair
        };
        r = step(r);
        t = step(t);
    }
    if !r.0.is_one() {
        return None;
    }
    if t.0 < BigInt::zero() {
        Some((t.0 + m).magnitude().clone())
    } else {
        Some(t.0.magnitude().clone())
    }
}

/// Computes a single Lagrange coefficient at zero,
/// `w_i = prod_{l in xs, l != i} l / (l - i) mod q`.
///
/// The output may be nonsensical if the nodes in `xs` are not unique.
fn get_single_coefficient_at_zero_unchecked(
    xs: &[FieldElement],
    i: &FieldElement,
    field: &ScalarField,
) -> FieldElement {
    xs.iter()
        .filter_map(|l| {
            let l_minus_i = l.sub(i, field);
            let inv_l_minus_i = l_minus_i.inv(field)?;
            Some(l.mul(&inv_l_minus_i, field))
        })
        .fold(ScalarField::one(), |acc, s| acc.mul(&s, field))
}

/// Computes a single Lagrange coefficient at zero.
///
/// Returns `None` if `i` is not in `xs` or if the nodes in `xs` are not
/// unique.
pub fn get_single_coefficient_at_zero(
    xs: &[FieldElement],
    i: &FieldElement,
    field: &ScalarField,
) -> Option<FieldElement> {
    if !xs.contains(i) || !xs.iter().all_unique() {
        return None;
    }
    Some(get_single_coefficient_at_zero_unchecked(xs, i, field))
}

fn get_lagrange_coefficients_at_zero_unchecked(
    xs: &[FieldElement],
    field: &ScalarField,
) -> Vec<FieldElement> {
    xs.iter()
        .map(|i| get_single_coefficient_at_zero_unchecked(xs, i, field))
        .collect()
}

/// Computes the Lagrange interpolation at zero in the field `Z_q`.
///
/// Returns `None` if the nodes in `xs` are not unique or if `xs` and `ys`
/// differ in length.
pub fn field_lagrange_at_zero(
    xs: &[FieldElement],
    ys: &[FieldElement],
    field: &ScalarField,
) -> Option<FieldElement> {
    if xs.len() != ys.len() || !xs.iter().all_unique() {
        return None;
    }
    let coeffs = get_lagrange_coefficients_at_zero_unchecked(xs, field);
    let y0 = zip(coeffs, ys)
        .map(|(c, y)| c.mul(y, field))
        .fold(ScalarField::zero(), |acc, s| acc.add(&s, field));
    Some(y0)
}

/// Computes the Lagrange interpolation at zero in the exponent of group
/// elements.
///
/// Returns `None` if the nodes in `xs` are not unique or if `xs` and `ys`
/// differ in length.
pub fn group_lagrange_at_zero(
    xs: &[FieldElement],
    ys: &[GroupElement],
    field: &ScalarField,
    group: &Group,
) -> Option<GroupElement> {
    if xs.len() != ys.len() || !xs.iter().all_unique() {
        return None;
    }
    let coeffs = get_lagrange_coefficients_at_zero_unchecked(xs, field);
    let y0 = zip(coeffs, ys)
        .map(|(c, y)| y.exp(&c, group))
        .fold(Group::one(), |acc, s| acc.mul(&s, group));
    Some(y0)
}
