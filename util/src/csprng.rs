// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! A deterministic CSPRNG backed by the SHAKE-256 extendable-output function.
//!
//! Seeding from caller-supplied bytes keeps key-ceremony and encryption tests
//! reproducible while remaining cryptographically strong whenever the seed
//! itself carries enough entropy (e.g. from the OS).

use num_bigint::BigUint;
use num_traits::Zero;
use std::num::NonZeroUsize;

pub struct Csprng(Box<dyn sha3::digest::XofReader>);

impl Csprng {
    /// Creates a new `Csprng` from the given seed bytes.
    pub fn new(seed: &[u8]) -> Csprng {
        use sha3::digest::{ExtendableOutput, Update};

        let mut hasher = sha3::Shake256::default();

        let buf = b"csprng for electionguard core";
        hasher.update(&(buf.len() as u64).to_le_bytes());
        hasher.update(&buf[..]);

        hasher.update(&(seed.len() as u64).to_le_bytes());
        hasher.update(seed);

        Csprng(Box::new(hasher.finalize_xof()))
    }

    /// Returns a uniformly random `u8`.
    pub fn next_u8(&mut self) -> u8 {
        let mut buf = [0u8];
        self.0.read(&mut buf);
        buf[0]
    }

    /// Returns a uniformly random `u32`.
    pub fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.read(&mut buf);
        u32::from_le_bytes(buf)
    }

    /// Returns a uniformly random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.read(&mut buf);
        u64::from_le_bytes(buf)
    }

    /// Returns a uniformly random `bool`.
    pub fn next_bool(&mut self) -> bool {
        self.next_u8() & 1 != 0
    }

    /// Fills the buffer with random bytes.
    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.read(dest);
    }

    /// Returns a random number chosen uniformly from `0 <= n < 2^bits`.
    pub fn next_biguint(&mut self, bits: NonZeroUsize) -> BigUint {
        let bits = bits.get();
        let cnt_bytes = bits.div_ceil(8);

        let mut buf = vec![0u8; cnt_bytes];
        self.0.read(buf.as_mut_slice());

        // Mask off any bits in excess of the requested count.
        let cnt_extra_bits = cnt_bytes * 8 - bits;
        if 0 < cnt_extra_bits {
            debug_assert!(cnt_extra_bits < 8);
            buf[0] &= 0xff_u8 >> cnt_extra_bits;
        }

        BigUint::from_bytes_be(buf.as_slice())
    }

    /// Returns a random number uniformly from `0 <= n < end` by rejection
    /// sampling. `end` must be greater than `0`.
    pub fn next_biguint_lt(&mut self, end: &BigUint) -> BigUint {
        assert!(!end.is_zero(), "end must be greater than 0");

        // `end` is nonzero, so it has at least one bit.
        #[allow(clippy::unwrap_used)]
        let bits = NonZeroUsize::new(end.bits() as usize).unwrap();

        loop {
            let n = self.next_biguint(bits);
            if &n < end {
                break n;
            }
        }
    }

    /// Returns a random number uniformly from `start <= n < end`.
    /// `start` must be less than `end`.
    pub fn next_biguint_range(&mut self, start: &BigUint, end: &BigUint) -> BigUint {
        assert!(start < end, "start must be less than end");
        start + self.next_biguint_lt(&(end - start))
    }
}

impl rand::RngCore for Csprng {
    fn next_u32(&mut self) -> u32 {
        self.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.read(dest);
    }
}
