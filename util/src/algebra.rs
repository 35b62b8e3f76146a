// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Wrappers around [`BigUint`] separating the two element kinds that the
//! protocol mixes freely on paper and must never mix in code: elements of the
//! scalar field `Z_q` and elements of the multiplicative subgroup of `Z_p`.

use std::sync::{Arc, OnceLock};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    algebra_utils::{cnt_bits_repr, mod_inverse, to_be_bytes_left_pad},
    csprng::Csprng,
};

/// An element of the field `Z_q` as defined by [`ScalarField`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldElement(
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_256_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_256_bits"
    )]
    BigUint,
);

/// The finite field `Z_q` of integers modulo prime `q`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScalarField {
    /// Subgroup order.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_256_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_256_bits"
    )]
    q: BigUint,
}

impl FieldElement {
    /// The numeric value of the field element. Guaranteed to be `< q`.
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    /// Computes `(self + other) % q`.
    pub fn add(&self, other: &FieldElement, field: &ScalarField) -> Self {
        FieldElement((&self.0 + &other.0) % &field.q)
    }

    /// Computes `(self - other) % q`.
    pub fn sub(&self, other: &FieldElement, field: &ScalarField) -> Self {
        if self.0 >= other.0 {
            FieldElement(&self.0 - &other.0)
        } else {
            FieldElement(&field.q - (&other.0 - &self.0))
        }
    }

    /// Computes the additive inverse `(q - self) % q`.
    pub fn negate(&self, field: &ScalarField) -> Self {
        if self.0.is_zero() {
            FieldElement(BigUint::zero())
        } else {
            FieldElement(&field.q - &self.0)
        }
    }

    /// Computes `(self * other) % q`.
    pub fn mul(&self, other: &FieldElement, field: &ScalarField) -> Self {
        FieldElement((&self.0 * &other.0) % &field.q)
    }

    /// Computes the multiplicative inverse in `Z_q` if it exists,
    /// i.e. iff `gcd(self, q) == 1`.
    pub fn inv(&self, field: &ScalarField) -> Option<Self> {
        mod_inverse(&self.0, &field.q).map(FieldElement)
    }

    /// Performs modular exponentiation with a given integer exponent.
    pub fn pow(&self, exponent: impl Into<BigUint>, field: &ScalarField) -> FieldElement {
        let x = exponent.into();
        FieldElement(self.0.modpow(&x, &field.q))
    }

    /// Creates a field element from a given integer, reducing it modulo `q`.
    pub fn from<T>(x: T, field: &ScalarField) -> Self
    where
        BigUint: From<T>,
    {
        FieldElement(BigUint::from(x) % &field.q)
    }

    /// Creates a field element from big-endian bytes, reducing modulo `q`.
    pub fn from_bytes_be(x: &[u8], field: &ScalarField) -> Self {
        FieldElement(BigUint::from_bytes_be(x) % &field.q)
    }

    /// Creates a field element from an integer already in canonical form.
    ///
    /// Returns `None` if the value is not in `[0, q)`; the caller decides
    /// whether that is an `InvalidElement` condition.
    pub fn try_new_canonical(x: BigUint, field: &ScalarField) -> Option<Self> {
        (x < field.q).then_some(FieldElement(x))
    }

    /// Returns the big-endian encoding left-padded to 32 bytes.
    pub fn to_32_be_bytes(&self) -> Vec<u8> {
        to_be_bytes_left_pad(&self.0, 32)
    }

    /// Returns the big-endian encoding left-padded to the field width.
    pub fn to_be_bytes_left_pad(&self, field: &ScalarField) -> Vec<u8> {
        to_be_bytes_left_pad(&self.0, field.q_len_bytes())
    }

    /// Returns true if the element is zero.
    pub fn is_zero(&self) -> bool {
        BigUint::is_zero(&self.0)
    }

    /// Returns true iff `0 <= self < q`.
    pub fn is_valid(&self, field: &ScalarField) -> bool {
        // The lower bound holds because the representation is unsigned.
        self.0 < field.q
    }
}

impl Zeroize for FieldElement {
    /// Best-effort erasure. `BigUint` offers no in-place overwrite, so this
    /// releases the limb buffer after replacing the value with zero.
    fn zeroize(&mut self) {
        self.0 = BigUint::zero();
    }
}

impl ScalarField {
    /// Constructs a scalar field from a given order.
    ///
    /// The order is *assumed* prime; parameter validation happens once at
    /// startup, not here.
    pub fn new_unchecked(order: BigUint) -> Self {
        ScalarField { q: order }
    }

    /// Returns one, the neutral element of multiplication.
    pub fn one() -> FieldElement {
        FieldElement(BigUint::one())
    }

    /// Returns zero, the neutral element of addition.
    pub fn zero() -> FieldElement {
        FieldElement(BigUint::zero())
    }

    /// Returns a uniform random integer in `[0, q)`.
    pub fn random_field_elem(&self, csprng: &mut Csprng) -> FieldElement {
        FieldElement(csprng.next_biguint_lt(&self.q))
    }

    /// Returns the order `q` of the field.
    pub fn order(&self) -> &BigUint {
        &self.q
    }

    /// Returns the length of the byte representation of `q`.
    ///
    /// For the standard parameters this is `32`.
    pub fn q_len_bytes(&self) -> usize {
        cnt_bits_repr(&self.q).div_ceil(8)
    }

    /// Returns the number of bits required to represent `q`.
    pub fn q_len_bits(&self) -> usize {
        cnt_bits_repr(&self.q)
    }
}

/// An element of the multiplicative subgroup of `Z_p` as defined by [`Group`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupElement(
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_4096_bits"
    )]
    BigUint,
);

/// The order-`q` multiplicative subgroup of `Z_p`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    /// Prime modulus `p`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_4096_bits"
    )]
    p: BigUint,

    /// Subgroup generator `g`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_4096_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_4096_bits"
    )]
    g: BigUint,

    /// Subgroup order `q`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_256_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_256_bits"
    )]
    q: BigUint,

    /// Lazily-built fixed-base exponentiation table for `g`.
    #[serde(skip)]
    g_table: OnceLock<Arc<FixedBaseTable>>,
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.p == other.p && self.g == other.g && self.q == other.q
    }
}

impl Eq for Group {}

impl GroupElement {
    /// Computes `(self * other) mod p`.
    pub fn mul(&self, other: &GroupElement, group: &Group) -> GroupElement {
        GroupElement((&self.0 * &other.0) % &group.p)
    }

    /// Computes the multiplicative inverse mod `p`.
    ///
    /// For valid group elements this always returns some value.
    pub fn inv(&self, group: &Group) -> Option<Self> {
        mod_inverse(&self.0, &group.p).map(GroupElement)
    }

    /// Performs modular exponentiation with a given integer exponent.
    pub fn pow(&self, exponent: impl Into<BigUint>, group: &Group) -> GroupElement {
        let x = exponent.into();
        GroupElement(self.0.modpow(&x, &group.p))
    }

    /// Raises the element to a *public* field-element exponent.
    ///
    /// Variable-time; use [`GroupElement::exp_secret`] whenever the exponent
    /// must not leak.
    pub fn exp(&self, exponent: &FieldElement, group: &Group) -> GroupElement {
        GroupElement(self.0.modpow(&exponent.0, &group.p))
    }

    /// Raises the element to a *secret* field-element exponent.
    ///
    /// A square-and-always-multiply ladder over exactly `bits(q)` iterations,
    /// so the operation sequence does not depend on the exponent value.
    pub fn exp_secret(&self, exponent: &FieldElement, group: &Group) -> GroupElement {
        let bits = cnt_bits_repr(&group.q) as u64;
        let mut acc = BigUint::one();
        for i in (0..bits).rev() {
            acc = &acc * &acc % &group.p;
            let acc_times_base = &acc * &self.0 % &group.p;
            if exponent.0.bit(i) {
                acc = acc_times_base;
            }
        }
        GroupElement(acc)
    }

    /// Returns true iff `0 <= self < p` and `self^q % p == 1`, i.e. the
    /// element is a member of the order-`q` subgroup.
    pub fn is_valid(&self, group: &Group) -> bool {
        // The lower bound holds because the representation is unsigned.
        let elem_less_than_p = self.0 < group.p;
        elem_less_than_p && self.0.modpow(&group.q, &group.p).is_one()
    }

    /// Creates a group element from an integer already in canonical form.
    ///
    /// Returns `None` if the value is not in `[0, p)`. Subgroup membership is
    /// a separate, more expensive check via [`GroupElement::is_valid`].
    pub fn try_new_canonical(x: BigUint, group: &Group) -> Option<Self> {
        (x < group.p).then_some(GroupElement(x))
    }

    /// Returns the big-endian encoding left-padded to the group width.
    pub fn to_be_bytes_left_pad(&self, group: &Group) -> Vec<u8> {
        to_be_bytes_left_pad(&self.0, group.p_len_bytes())
    }

    /// Returns a reference to the element as a [`BigUint`].
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl Group {
    /// Constructs a multiplicative subgroup of `Z_p` from its modulus,
    /// order and generator.
    ///
    /// The parameters are *assumed* consistent; validation happens once at
    /// startup against the pinned constants, not here.
    pub fn new_unchecked(modulus: BigUint, order: BigUint, generator: BigUint) -> Self {
        Group {
            p: modulus,
            g: generator,
            q: order,
            g_table: OnceLock::new(),
        }
    }

    /// Returns a uniform random group element `g^x` for `x` uniform in `[0, q)`.
    pub fn random_group_elem(&self, csprng: &mut Csprng) -> GroupElement {
        let x = FieldElement(csprng.next_biguint_lt(&self.q));
        self.g_exp(&x)
    }

    /// Returns `g^x mod p`.
    ///
    /// This is the hot path of the whole crate; it runs off a lazily-built
    /// fixed-window table over `g` and performs the same multiplication count
    /// for every exponent.
    pub fn g_exp(&self, x: &FieldElement) -> GroupElement {
        let table = self
            .g_table
            .get_or_init(|| Arc::new(FixedBaseTable::new(&self.g, &self.p, cnt_bits_repr(&self.q))));
        GroupElement(table.exp(&x.0))
    }

    /// Returns one, the neutral element.
    pub fn one() -> GroupElement {
        GroupElement(BigUint::one())
    }

    /// Returns a reference to the order of the group.
    pub fn order(&self) -> &BigUint {
        &self.q
    }

    /// Returns a reference to the modulus of the group.
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    /// Returns the generator of the group.
    pub fn generator(&self) -> GroupElement {
        GroupElement(self.g.clone())
    }

    /// Returns the length of the byte representation of `p`.
    ///
    /// For the standard parameters this is `512`.
    pub fn p_len_bytes(&self) -> usize {
        cnt_bits_repr(&self.p).div_ceil(8)
    }

    /// Returns true if the group and the given field have the same order.
    pub fn matches_field(&self, field: &ScalarField) -> bool {
        self.q == field.q
    }
}

/// Precomputed multiples `g^(j * 2^(w*i))` enabling fixed-base exponentiation
/// with a handful of multiplications per call.
struct FixedBaseTable {
    p: BigUint,
    /// `table[i][j] = g^(j << (WINDOW_BITS * i)) mod p`, `0 <= j < 2^WINDOW_BITS`.
    table: Vec<Vec<BigUint>>,
}

impl FixedBaseTable {
    const WINDOW_BITS: usize = 4;

    fn new(g: &BigUint, p: &BigUint, exponent_bits: usize) -> Self {
        let num_windows = exponent_bits.div_ceil(Self::WINDOW_BITS);
        let window_size = 1usize << Self::WINDOW_BITS;

        let mut table = Vec::with_capacity(num_windows);
        let mut base = g % p;
        for _ in 0..num_windows {
            let mut row = Vec::with_capacity(window_size);
            let mut acc = BigUint::one();
            for _ in 0..window_size {
                row.push(acc.clone());
                acc = acc * &base % p;
            }
            // The next window's base is g^(2^WINDOW_BITS) relative to this one.
            base = acc;
            table.push(row);
        }

        FixedBaseTable {
            p: p.clone(),
            table,
        }
    }

    /// Computes `g^x mod p` for `0 <= x < 2^(WINDOW_BITS * num_windows)`.
    ///
    /// Every call performs one multiplication per window regardless of the
    /// exponent's bit pattern.
    fn exp(&self, x: &BigUint) -> BigUint {
        let mut acc = BigUint::one();
        for (i, row) in self.table.iter().enumerate() {
            let window = Self::window_at(x, i);
            acc = acc * &row[window] % &self.p;
        }
        acc
    }

    fn window_at(x: &BigUint, window_ix: usize) -> usize {
        let lo = (window_ix * Self::WINDOW_BITS) as u64;
        let mut w = 0usize;
        for b in 0..Self::WINDOW_BITS as u64 {
            if x.bit(lo + b) {
                w |= 1 << b;
            }
        }
        w
    }
}

impl std::fmt::Debug for FixedBaseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedBaseTable")
            .field("windows", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::csprng::Csprng;
    use num_bigint::BigUint;

    fn get_toy_algebras() -> (ScalarField, Group) {
        (
            ScalarField::new_unchecked(BigUint::from(127_u8)),
            Group::new_unchecked(
                BigUint::from(59183_u32),
                BigUint::from(127_u8),
                BigUint::from(32616_u32),
            ),
        )
    }

    #[test]
    fn test_field_operations() {
        let (field, _) = get_toy_algebras();

        let a = FieldElement::from(115_u8, &field);
        let b = FieldElement::from(37_u8, &field);

        // 242 = 115 mod 127
        assert_eq!(a, FieldElement::from(242_u8, &field));

        // 25 = (115 + 37) mod 127
        assert_eq!(a.add(&b, &field), FieldElement::from(25_u8, &field));

        // 78 = (115 - 37) mod 127
        assert_eq!(a.sub(&b, &field), FieldElement::from(78_u8, &field));

        // (37 - 115) = -78 = 49 mod 127
        assert_eq!(b.sub(&a, &field), FieldElement::from(49_u8, &field));

        assert_eq!(b.sub(&b, &field), ScalarField::zero());

        // -115 = 12 mod 127
        assert_eq!(a.negate(&field), FieldElement::from(12_u8, &field));
        assert_eq!(ScalarField::zero().negate(&field), ScalarField::zero());

        // 4255 = 64 mod 127
        assert_eq!(a.mul(&b, &field), FieldElement::from(64_u8, &field));

        // 115 ^ 23 = 69 mod 127
        assert_eq!(a.pow(23_u8, &field), FieldElement::from(69_u8, &field));

        // 115 * 74 = 1 mod 127
        let a_inv = a.inv(&field).unwrap();
        assert_eq!(a_inv, FieldElement::from(74_u8, &field));
        assert_eq!(a.mul(&a_inv, &field), ScalarField::one());
    }

    #[test]
    fn test_group_operations() {
        let mut csprng = Csprng::new(b"testing group operations");
        let (field, group) = get_toy_algebras();

        let a = FieldElement::from(115_u8, &field);
        let g1 = group.g_exp(&a);

        // g2 = g^14, g3 = g1*g2, g1_inv computed externally
        let g2 = GroupElement(BigUint::from(38489_u32));
        let g3 = GroupElement(BigUint::from(48214_u32));
        let g1_inv = GroupElement(BigUint::from(58095_u32));

        // h is not a group element
        let h = GroupElement(BigUint::from(12345_u32));

        assert!(g1.is_valid(&group));
        assert!(g2.is_valid(&group));
        assert!(!h.is_valid(&group));

        assert_eq!(g1.mul(&g2, &group), g3);

        assert_eq!(g1.inv(&group), Some(g1_inv.clone()));
        assert_eq!(g1.mul(&g1_inv, &group), Group::one());

        let g = group.generator();
        assert_eq!(g.pow(14_u32, &group), g2);

        for _ in 0..100 {
            let u = group.random_group_elem(&mut csprng);
            assert!(u.is_valid(&group));
        }
    }

    #[test]
    fn test_fixed_base_table_matches_modpow() {
        let mut csprng = Csprng::new(b"testing fixed base table");
        let (field, group) = get_toy_algebras();
        let g = group.generator();

        for _ in 0..200 {
            let x = field.random_field_elem(&mut csprng);
            assert_eq!(group.g_exp(&x), g.exp(&x, &group));
        }
    }

    #[test]
    fn test_exp_secret_matches_exp() {
        let mut csprng = Csprng::new(b"testing secret exponentiation");
        let (field, group) = get_toy_algebras();

        for _ in 0..50 {
            let base = group.random_group_elem(&mut csprng);
            let x = field.random_field_elem(&mut csprng);
            assert_eq!(base.exp_secret(&x, &group), base.exp(&x, &group));
        }
    }

    #[test]
    fn test_canonical_construction() {
        let (field, group) = get_toy_algebras();

        assert!(FieldElement::try_new_canonical(BigUint::from(126_u8), &field).is_some());
        assert!(FieldElement::try_new_canonical(BigUint::from(127_u8), &field).is_none());
        assert!(GroupElement::try_new_canonical(BigUint::from(59182_u32), &group).is_some());
        assert!(GroupElement::try_new_canonical(BigUint::from(59183_u32), &group).is_none());
    }

    #[test]
    fn test_field_conversions() {
        let (field, _) = get_toy_algebras();

        // 65 is the field element from the bytes "A"
        let u = FieldElement(BigUint::from(65_u8));
        assert_eq!(u, FieldElement::from(65_u8, &field));
        assert_eq!(u, FieldElement::from_bytes_be(b"A", &field));

        // 69 = 16706 mod 127 is the field element from the bytes "AB"
        let v = FieldElement(BigUint::from(69_u8));
        assert_eq!(v, FieldElement::from(16706_u16, &field));
        assert_eq!(v, FieldElement::from_bytes_be(b"AB", &field));

        assert_eq!(u.to_be_bytes_left_pad(&field), vec![65_u8]);
        assert_eq!(u.to_32_be_bytes().len(), 32);
    }
}
