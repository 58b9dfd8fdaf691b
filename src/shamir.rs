//! Shamir Secret Sharing over GF(n), n = the secp256k1 group order.
//!
//! `split` builds a random degree-(t-1) polynomial with the secret as its
//! constant term and evaluates it at `1..=total`; `combine` runs Lagrange
//! interpolation at x=0 over whatever shares are handed to it.

use rand::{CryptoRng, RngCore};

use crate::error::{Result, WalletError};
use crate::field::Scalar;

/// A single point `(x, f(x))` on the secret polynomial. `x = 0` is
/// forbidden — it would reveal the secret directly.
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    pub index: u8,
    pub value: Scalar,
}

impl Share {
    pub fn new(index: u8, value: Scalar) -> Result<Self> {
        if index == 0 {
            return Err(WalletError::ConfigInvalid);
        }
        Ok(Share { index, value })
    }
}

/// Splits `secret` into `total` shares, `threshold` of which reconstruct
/// it. `secret == 0` is permitted (the polynomial's constant term is
/// simply zero); only the share index `x` may never be zero.
pub fn split(
    secret: &Scalar,
    total: u8,
    threshold: u8,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Vec<Share>> {
    if total < 2 || threshold < 2 || threshold > total {
        return Err(WalletError::ConfigInvalid);
    }

    let mut coefficients = Vec::with_capacity(threshold as usize);
    coefficients.push(secret.clone());
    for _ in 1..threshold {
        coefficients.push(Scalar::random(rng));
    }

    let shares = (1..=total)
        .map(|x| {
            let value = evaluate(&coefficients, x);
            Share { index: x, value }
        })
        .collect();

    Ok(shares)
}

/// Evaluates the polynomial with the given coefficients (lowest degree
/// first) at the point `x`, via Horner's method.
fn evaluate(coefficients: &[Scalar], x: u8) -> Scalar {
    let x_scalar = scalar_from_u8(x);
    let mut result = Scalar::ZERO;
    for coeff in coefficients.iter().rev() {
        result = result.mul(&x_scalar).add(coeff);
    }
    result
}

fn scalar_from_u8(x: u8) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[31] = x;
    // x ranges over 1..=255, always a valid canonical scalar encoding.
    Scalar::from_bytes(&bytes).expect("u8 always fits the scalar field")
}

/// Reconstructs the secret via Lagrange interpolation at x=0. Requires at
/// least two shares and no duplicate indices; does not itself know the
/// original threshold, so it interpolates over exactly the shares given —
/// callers are responsible for supplying a consistent subset of size >=
/// threshold.
pub fn combine(shares: &[Share]) -> Result<Scalar> {
    if shares.len() < 2 {
        return Err(WalletError::TooFewShares);
    }

    let mut seen = std::collections::HashSet::new();
    for share in shares {
        if !seen.insert(share.index) {
            return Err(WalletError::DuplicateIndex);
        }
    }

    let mut secret = Scalar::ZERO;
    for (i, share_i) in shares.iter().enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        let x_i = scalar_from_u8(share_i.index);

        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            let x_j = scalar_from_u8(share_j.index);
            numerator = numerator.mul(&x_j.neg());
            denominator = denominator.mul(&x_i.sub(&x_j));
        }

        let denom_inv = denominator
            .invert()
            .ok_or(WalletError::DuplicateIndex)?;
        let lagrange_coeff = numerator.mul(&denom_inv);
        secret = secret.add(&share_i.value.mul(&lagrange_coeff));
    }

    Ok(secret)
}
