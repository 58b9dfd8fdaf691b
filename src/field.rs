//! Field arithmetic over the secp256k1 scalar field GF(n).
//!
//! `Scalar` wraps `k256::Scalar` rather than re-deriving modular
//! arithmetic by hand: the underlying `elliptic-curve`/`crypto-bigint`
//! machinery already gives constant-time add/sub/mul/neg and a
//! constant-time Fermat inverse via a fixed addition chain. Re-deriving
//! that here by hand would be exactly the kind of hand-rolled stdlib
//! replacement this codebase avoids.

use k256::elliptic_curve::ff::{Field, PrimeField};
use k256::elliptic_curve::scalar::IsHigh;
use rand::{CryptoRng, RngCore};
use subtle::{Choice, ConditionallySelectable};
use zeroize::Zeroize;

use crate::error::{Result, WalletError};

/// An element of GF(n), n = the secp256k1 group order.
///
/// Deliberately not `Copy`: scalars here are secret-adjacent (shares,
/// reconstructed keys) and callers are expected to `zeroize()` them when
/// done rather than let bitwise copies linger on the stack.
#[derive(Clone, PartialEq, Eq)]
pub struct Scalar(k256::Scalar);

impl Scalar {
    pub const ZERO: Scalar = Scalar(k256::Scalar::ZERO);
    pub const ONE: Scalar = Scalar(k256::Scalar::ONE);

    /// Builds a scalar from 32 big-endian bytes. Fails `InvalidScalar` if
    /// the value is not in canonical range `[0, n)`. Zero is accepted —
    /// only `Share::x` forbids zero, not the field itself.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let repr = k256::FieldBytes::clone_from_slice(bytes);
        let candidate = k256::Scalar::from_repr(repr);
        if candidate.is_some().into() {
            Ok(Scalar(candidate.unwrap()))
        } else {
            Err(WalletError::InvalidScalar)
        }
    }

    /// Like `from_bytes`, but additionally rejects zero. Used where a
    /// nonzero scalar is required, e.g. an imported signing key.
    pub fn from_bytes_nonzero(bytes: &[u8; 32]) -> Result<Self> {
        let s = Self::from_bytes(bytes)?;
        if s.is_zero() {
            Err(WalletError::InvalidScalar)
        } else {
            Ok(s)
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(|_| WalletError::InvalidScalar)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| WalletError::InvalidScalar)?;
        Self::from_bytes(&arr)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let repr = self.0.to_repr();
        let mut out = [0u8; 32];
        out.copy_from_slice(repr.as_slice());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero().into()
    }

    /// Uniformly random nonzero scalar, sampled via rejection on the
    /// canonical 32-byte encoding: a 256-bit value is drawn, rejected if
    /// it is all-zero or >= n, and redrawn otherwise.
    pub fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        loop {
            let mut buf = [0u8; 32];
            rng.fill_bytes(&mut buf);
            if let Ok(candidate) = Self::from_bytes(&buf) {
                if !candidate.is_zero() {
                    return candidate;
                }
            }
            buf.zeroize();
        }
    }

    pub fn add(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 + other.0)
    }

    pub fn sub(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 - other.0)
    }

    pub fn mul(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 * other.0)
    }

    pub fn neg(&self) -> Scalar {
        Scalar(-self.0)
    }

    /// Multiplicative inverse, `None` for zero. Constant-time: the
    /// underlying implementation runs a fixed addition chain for the
    /// Fermat exponent `n - 2` regardless of the input value.
    pub fn invert(&self) -> Option<Scalar> {
        let inv = self.0.invert();
        if inv.is_some().into() {
            Some(Scalar(inv.unwrap()))
        } else {
            None
        }
    }

    /// Modular exponentiation by a public, fixed-width exponent, via
    /// square-and-always-multiply. Exposed for completeness; `invert`
    /// does not route through this (it uses the library's own chain).
    pub fn pow(&self, exponent: &[u8; 32]) -> Scalar {
        let mut result = Scalar::ONE;
        for byte in exponent.iter() {
            for bit_idx in (0..8).rev() {
                result = result.mul(&result);
                let bit = Choice::from((byte >> bit_idx) & 1);
                let multiplied = result.mul(self);
                result.0 = k256::Scalar::conditional_select(&result.0, &multiplied.0, bit);
            }
        }
        result
    }

    /// `true` if `self > n/2`, used for ECDSA low-S normalization.
    pub fn is_high(&self) -> bool {
        self.0.is_high().into()
    }

    pub(crate) fn inner(&self) -> &k256::Scalar {
        &self.0
    }

    pub(crate) fn from_inner(s: k256::Scalar) -> Self {
        Scalar(s)
    }
}

impl core::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Scalar").field(&"[REDACTED]").finish()
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0 = k256::Scalar::ZERO;
    }
}

impl core::ops::Add for Scalar {
    type Output = Scalar;
    fn add(self, rhs: Scalar) -> Scalar {
        Scalar::add(&self, &rhs)
    }
}

impl core::ops::Sub for Scalar {
    type Output = Scalar;
    fn sub(self, rhs: Scalar) -> Scalar {
        Scalar::sub(&self, &rhs)
    }
}

impl core::ops::Mul for Scalar {
    type Output = Scalar;
    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar::mul(&self, &rhs)
    }
}

impl core::ops::Neg for Scalar {
    type Output = Scalar;
    fn neg(self) -> Scalar {
        Scalar::neg(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(byte: u8) -> Scalar {
        let mut b = [0u8; 32];
        b[31] = byte;
        Scalar::from_bytes(&b).unwrap()
    }

    #[test]
    fn zero_is_accepted() {
        assert!(s(0).is_zero());
    }

    #[test]
    fn add_sub_roundtrip() {
        let a = s(7);
        let b = s(20);
        assert_eq!(a.add(&b).sub(&b), a);
    }

    #[test]
    fn mul_inverse_is_identity() {
        let a = s(42);
        let inv = a.invert().unwrap();
        assert_eq!(a.mul(&inv), Scalar::ONE);
    }

    #[test]
    fn zero_has_no_inverse() {
        assert!(Scalar::ZERO.invert().is_none());
    }

    #[test]
    fn neg_then_add_is_zero() {
        let a = s(99);
        assert_eq!(a.add(&a.neg()), Scalar::ZERO);
    }

    #[test]
    fn rejects_out_of_range_bytes() {
        // n itself is not a valid canonical scalar encoding.
        let n = hex::decode("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141")
            .unwrap();
        let arr: [u8; 32] = n.try_into().unwrap();
        assert!(Scalar::from_bytes(&arr).is_err());
    }

    #[test]
    fn random_is_nonzero_and_round_trips() {
        let mut rng = rand::rngs::OsRng;
        for _ in 0..64 {
            let r = Scalar::random(&mut rng);
            assert!(!r.is_zero());
            assert_eq!(Scalar::from_bytes(&r.to_bytes()).unwrap(), r);
        }
    }

    #[test]
    fn pow_matches_repeated_multiplication() {
        let base = s(3);
        let mut exponent = [0u8; 32];
        exponent[31] = 5;
        let by_pow = base.pow(&exponent);
        let by_mul = base.mul(&base).mul(&base).mul(&base).mul(&base);
        assert_eq!(by_pow, by_mul);
    }
}
