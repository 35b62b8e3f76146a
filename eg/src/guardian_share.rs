// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Encryption of polynomial coordinates for backup distribution.
//!
//! A backup `P_i(l)` is a 32-byte scalar, so it travels under hashed
//! ElGamal: an ephemeral pad `alpha = g^xi` and shared point
//! `beta = K_l^xi` feed a key derivation, the coordinate is XOR-encrypted,
//! and an HMAC binds the pieces together. Exponential ElGamal cannot carry a
//! full scalar (the bounded discrete log would be astronomical).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use util::{
    algebra::{FieldElement, GroupElement},
    csprng::Csprng,
};

use crate::fixed_parameters::FixedParameters;

type HmacSha256 = Hmac<Sha256>;

const COORDINATE_BYTE_LEN: usize = 32;

fn bytes32_serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut s = String::with_capacity(64);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s.serialize(serializer)
}

fn bytes32_deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    if s.len() != 64 {
        return Err(D::Error::custom("expected 64 hex digits"));
    }
    let mut out = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex = std::str::from_utf8(chunk).map_err(D::Error::custom)?;
        out[i] = u8::from_str_radix(hex, 16).map_err(D::Error::custom)?;
    }
    Ok(out)
}

/// Errors occurring while decrypting a [`CoordinateCiphertext`].
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CoordinateDecryptionError {
    /// The MAC does not verify; the ciphertext was tampered with or was
    /// encrypted to a different recipient.
    #[error("The MAC does not verify.")]
    InvalidMac,

    /// The decrypted bytes do not form a canonical field element.
    #[error("The decrypted coordinate is not a canonical element of Z_q.")]
    InvalidCoordinate,
}

/// A polynomial coordinate encrypted to a recipient's election public key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinateCiphertext {
    /// Ephemeral pad `alpha = g^xi`.
    pub alpha: GroupElement,

    /// The XOR-encrypted coordinate.
    #[serde(
        serialize_with = "bytes32_serialize",
        deserialize_with = "bytes32_deserialize"
    )]
    pub encrypted_coordinate: [u8; COORDINATE_BYTE_LEN],

    /// HMAC over the pad and the encrypted coordinate.
    #[serde(
        serialize_with = "bytes32_serialize",
        deserialize_with = "bytes32_deserialize"
    )]
    pub mac: [u8; COORDINATE_BYTE_LEN],
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// Derives the per-share secret from the key agreement.
fn share_secret(
    fixed_parameters: &FixedParameters,
    dealer: u32,
    recipient: u32,
    recipient_public_key: &GroupElement,
    alpha: &GroupElement,
    beta: &GroupElement,
) -> [u8; 32] {
    let group = fixed_parameters.group();

    let mut v = b"backup_share_secret".to_vec();
    v.extend_from_slice(&dealer.to_be_bytes());
    v.extend_from_slice(&recipient.to_be_bytes());
    v.extend_from_slice(&recipient_public_key.to_be_bytes_left_pad(group));
    v.extend_from_slice(&alpha.to_be_bytes_left_pad(group));
    v.extend_from_slice(&beta.to_be_bytes_left_pad(group));
    Sha256::digest(&v).into()
}

/// Derives the MAC key and the encryption key from the share secret.
fn mac_and_encryption_keys(dealer: u32, recipient: u32, secret: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let mut context = b"backup_share_encrypt".to_vec();
    context.extend_from_slice(&dealer.to_be_bytes());
    context.extend_from_slice(&recipient.to_be_bytes());

    let derive = |domain: u8| -> [u8; 32] {
        // HMAC-SHA-256 accepts keys of any length, so this cannot fail.
        let mut mac = match <HmacSha256 as Mac>::new_from_slice(secret) {
            Ok(mac) => mac,
            Err(_) => return [0u8; 32],
        };
        mac.update(&[domain]);
        mac.update(&context);
        mac.finalize().into_bytes().into()
    };

    (derive(0x01), derive(0x02))
}

fn share_mac(mac_key: &[u8; 32], pad_bytes: &[u8], encrypted: &[u8; 32]) -> [u8; 32] {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(mac_key) {
        Ok(mac) => mac,
        Err(_) => return [0u8; 32],
    };
    mac.update(pad_bytes);
    mac.update(encrypted);
    mac.finalize().into_bytes().into()
}

impl CoordinateCiphertext {
    /// Encrypts `coordinate` from guardian `dealer` to guardian `recipient`
    /// with a fresh ephemeral nonce.
    pub fn encrypt(
        csprng: &mut Csprng,
        fixed_parameters: &FixedParameters,
        dealer: u32,
        recipient: u32,
        recipient_public_key: &GroupElement,
        coordinate: &FieldElement,
    ) -> Self {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let xi = field.random_field_elem(csprng);
        let alpha = group.g_exp(&xi);
        let beta = recipient_public_key.exp_secret(&xi, group);

        let secret = share_secret(
            fixed_parameters,
            dealer,
            recipient,
            recipient_public_key,
            &alpha,
            &beta,
        );
        let (mac_key, encryption_key) = mac_and_encryption_keys(dealer, recipient, &secret);

        let mut coordinate_bytes = [0u8; COORDINATE_BYTE_LEN];
        coordinate_bytes.copy_from_slice(&coordinate.to_32_be_bytes());
        let encrypted_coordinate = xor32(&coordinate_bytes, &encryption_key);

        let mac = share_mac(
            &mac_key,
            &alpha.to_be_bytes_left_pad(group),
            &encrypted_coordinate,
        );

        CoordinateCiphertext {
            alpha,
            encrypted_coordinate,
            mac,
        }
    }

    /// Decrypts with the recipient's election secret key, verifying the MAC
    /// and that the coordinate is a canonical field element.
    pub fn decrypt(
        &self,
        fixed_parameters: &FixedParameters,
        dealer: u32,
        recipient: u32,
        recipient_secret_key: &FieldElement,
    ) -> Result<FieldElement, CoordinateDecryptionError> {
        let field = fixed_parameters.field();
        let group = fixed_parameters.group();

        let recipient_public_key = group.g_exp(recipient_secret_key);
        let beta = self.alpha.exp_secret(recipient_secret_key, group);

        let secret = share_secret(
            fixed_parameters,
            dealer,
            recipient,
            &recipient_public_key,
            &self.alpha,
            &beta,
        );
        let (mac_key, encryption_key) = mac_and_encryption_keys(dealer, recipient, &secret);

        let expected_mac = share_mac(
            &mac_key,
            &self.alpha.to_be_bytes_left_pad(group),
            &self.encrypted_coordinate,
        );
        if expected_mac != self.mac {
            return Err(CoordinateDecryptionError::InvalidMac);
        }

        let coordinate_bytes = xor32(&self.encrypted_coordinate, &encryption_key);
        let coordinate = num_bigint::BigUint::from_bytes_be(&coordinate_bytes);
        FieldElement::try_new_canonical(coordinate, field)
            .ok_or(CoordinateDecryptionError::InvalidCoordinate)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use num_bigint::BigUint;

    use crate::{elgamal::ElGamalKeyPair, fixed_parameters::FixedParameters};

    fn toy_parameters() -> FixedParameters {
        FixedParameters::new_unchecked(
            BigUint::from(59183_u32),
            BigUint::from(127_u8),
            BigUint::from(32616_u32),
            BigUint::from(466_u32),
        )
    }

    #[test]
    fn test_round_trip() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test coordinate round trip");

        let recipient = ElGamalKeyPair::generate(&mut csprng, &fixed_parameters);
        let coordinate = fixed_parameters.field().random_field_elem(&mut csprng);

        let ciphertext = CoordinateCiphertext::encrypt(
            &mut csprng,
            &fixed_parameters,
            1,
            2,
            recipient.public_key(),
            &coordinate,
        );

        let decrypted = ciphertext
            .decrypt(&fixed_parameters, 1, 2, recipient.secret_key())
            .unwrap();
        assert_eq!(decrypted, coordinate);
    }

    #[test]
    fn test_wrong_recipient_rejected() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test coordinate wrong recipient");

        let recipient = ElGamalKeyPair::generate(&mut csprng, &fixed_parameters);
        let other = ElGamalKeyPair::generate(&mut csprng, &fixed_parameters);
        let coordinate = fixed_parameters.field().random_field_elem(&mut csprng);

        let ciphertext = CoordinateCiphertext::encrypt(
            &mut csprng,
            &fixed_parameters,
            1,
            2,
            recipient.public_key(),
            &coordinate,
        );

        assert_eq!(
            ciphertext
                .decrypt(&fixed_parameters, 1, 2, other.secret_key())
                .err(),
            Some(CoordinateDecryptionError::InvalidMac)
        );
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test coordinate tamper");

        let recipient = ElGamalKeyPair::generate(&mut csprng, &fixed_parameters);
        let coordinate = fixed_parameters.field().random_field_elem(&mut csprng);

        let mut ciphertext = CoordinateCiphertext::encrypt(
            &mut csprng,
            &fixed_parameters,
            1,
            2,
            recipient.public_key(),
            &coordinate,
        );
        ciphertext.encrypted_coordinate[0] ^= 0x01;

        assert_eq!(
            ciphertext
                .decrypt(&fixed_parameters, 1, 2, recipient.secret_key())
                .err(),
            Some(CoordinateDecryptionError::InvalidMac)
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let fixed_parameters = toy_parameters();
        let mut csprng = Csprng::new(b"test coordinate serde");

        let recipient = ElGamalKeyPair::generate(&mut csprng, &fixed_parameters);
        let coordinate = fixed_parameters.field().random_field_elem(&mut csprng);

        let ciphertext = CoordinateCiphertext::encrypt(
            &mut csprng,
            &fixed_parameters,
            1,
            2,
            recipient.public_key(),
            &coordinate,
        );

        let json = serde_json::to_string(&ciphertext).unwrap();
        let parsed: CoordinateCiphertext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ciphertext);
    }
}
