//! Big integers with the byte-order convention of the logon protocol.
//!
//! Values travel on the wire as little-endian byte arrays padded to a
//! fixed width; all arithmetic is over non-negative integers.

use num_bigint::{BigInt, BigUint, Sign};
use rand::RngCore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigNumber(BigUint);

impl BigNumber {
    pub fn from_u32(value: u32) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    pub fn from_bytes_le(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_le(bytes))
    }

    /// A random value of `n_bytes` bytes from the thread CSPRNG.
    pub fn random(n_bytes: usize) -> Self {
        let mut bytes = vec![0u8; n_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(BigUint::from_bytes_be(&bytes))
    }

    pub fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    pub fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    /// `self^exp mod modulus`.
    pub fn mod_pow(&self, exp: &Self, modulus: &Self) -> Self {
        Self(self.0.modpow(&exp.0, &modulus.0))
    }

    /// `(self - other) mod modulus`, normalized into `[0, modulus)`.
    /// The subtraction may go negative mid-computation; the canonical
    /// residue is what the key agreement exponentiates.
    pub fn sub_mod(&self, other: &Self, modulus: &Self) -> Self {
        let a = BigInt::from_biguint(Sign::Plus, self.0.clone());
        let b = BigInt::from_biguint(Sign::Plus, other.0.clone());
        let m = BigInt::from_biguint(Sign::Plus, modulus.0.clone());
        let mut r = (a - b) % &m;
        if r.sign() == Sign::Minus {
            r += &m;
        }
        let (_, digits) = r.to_bytes_le();
        Self(BigUint::from_bytes_le(&digits))
    }

    /// Little-endian bytes, right-padded with zeros to at least
    /// `req_size`. A zero value encodes as all padding.
    pub fn as_bytes_le(&self, req_size: usize) -> Vec<u8> {
        let mut bytes = self.0.to_bytes_le();
        if bytes == [0] {
            bytes.clear();
        }
        if bytes.len() < req_size {
            bytes.resize(req_size, 0);
        }
        bytes
    }

    /// Big-endian bytes, left-padded with zeros to at least `req_size`.
    pub fn as_bytes_be(&self, req_size: usize) -> Vec<u8> {
        let mut bytes = self.as_bytes_le(req_size);
        bytes.reverse();
        bytes
    }
}
