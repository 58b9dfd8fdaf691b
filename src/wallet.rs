//! Orchestrates threshold share collection, zeroization, and signing on
//! top of `shamir` and `signer`. Never holds more scalar material than
//! the shares currently collected; the reconstructed signing key exists
//! only on the stack of a single `sign_*` call.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::envelope::{self, EnvelopeRecord};
use crate::error::{Result, WalletError};
use crate::field::Scalar;
use crate::rlp::Transaction;
use crate::shamir::{self, Share};
use crate::signer::{self, Signature};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    pub total_shares: u8,
    pub threshold: u8,
}

/// Immutable once a wallet is created or loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletState {
    pub key_id: String,
    pub public_key: String,
    pub address: String,
    pub config: WalletConfig,
}

/// `KeyShareRecord` with the scalar still in cleartext — handed to the
/// owner once, immediately after setup, for out-of-band backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainShareRecord {
    pub index: u8,
    pub scalar_hex: String,
    pub public_key: String,
    pub address: String,
    pub key_id: String,
    pub config: WalletConfig,
}

impl Zeroize for PlainShareRecord {
    fn zeroize(&mut self) {
        self.scalar_hex.zeroize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedShareRecord {
    pub index: u8,
    pub encrypted_share: EnvelopeRecord,
    pub public_key: String,
    pub address: String,
    pub key_id: String,
    pub config: WalletConfig,
}

pub struct CreateResult {
    pub wallet_state: WalletState,
    pub encrypted_shares: Vec<EncryptedShareRecord>,
    pub plain_shares: Vec<PlainShareRecord>,
}

fn random_key_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn derive_state(scalar: &Scalar, config: WalletConfig) -> Result<WalletState> {
    let pub_key = signer::public_key(scalar)?;
    let public_key = hex::encode(pub_key.to_encoded_point(false).as_bytes());
    let address = signer::address_from_public_key(&pub_key);
    Ok(WalletState {
        key_id: random_key_id(),
        public_key,
        address,
        config,
    })
}

fn seal_shares(
    shares: &[Share],
    passwords: &[&[u8]],
    state: &WalletState,
) -> Result<(Vec<EncryptedShareRecord>, Vec<PlainShareRecord>)> {
    if passwords.len() != shares.len() {
        return Err(WalletError::PasswordCountMismatch);
    }

    let mut encrypted = Vec::with_capacity(shares.len());
    let mut plain = Vec::with_capacity(shares.len());

    for (share, password) in shares.iter().zip(passwords.iter()) {
        let scalar_hex = share.value.to_hex();
        let envelope = envelope::seal(password, scalar_hex.as_bytes())?;
        encrypted.push(EncryptedShareRecord {
            index: share.index,
            encrypted_share: envelope.to_record(),
            public_key: state.public_key.clone(),
            address: state.address.clone(),
            key_id: state.key_id.clone(),
            config: state.config,
        });
        plain.push(PlainShareRecord {
            index: share.index,
            scalar_hex,
            public_key: state.public_key.clone(),
            address: state.address.clone(),
            key_id: state.key_id.clone(),
            config: state.config,
        });
    }

    Ok((encrypted, plain))
}

fn validate_config(total: u8, threshold: u8) -> Result<()> {
    if threshold < 2 || threshold > total {
        return Err(WalletError::ConfigInvalid);
    }
    Ok(())
}

/// Generates a fresh random scalar, splits it, and seals every share.
pub fn create(
    total: u8,
    threshold: u8,
    passwords: &[&[u8]],
) -> Result<CreateResult> {
    validate_config(total, threshold)?;
    if passwords.len() != total as usize {
        return Err(WalletError::PasswordCountMismatch);
    }

    let mut secret = Scalar::random(&mut rand::rngs::OsRng);
    let result = build_from_secret(&secret, total, threshold, passwords);
    secret.zeroize();
    result
}

/// Same as `create`, but the scalar is caller-supplied (e.g. imported
/// from an external key). Must be nonzero and canonical.
pub fn import_key(
    scalar_bytes: &[u8; 32],
    total: u8,
    threshold: u8,
    passwords: &[&[u8]],
) -> Result<CreateResult> {
    validate_config(total, threshold)?;
    if passwords.len() != total as usize {
        return Err(WalletError::PasswordCountMismatch);
    }
    let mut secret = Scalar::from_bytes_nonzero(scalar_bytes)?;
    let result = build_from_secret(&secret, total, threshold, passwords);
    secret.zeroize();
    result
}

fn build_from_secret(
    secret: &Scalar,
    total: u8,
    threshold: u8,
    passwords: &[&[u8]],
) -> Result<CreateResult> {
    let config = WalletConfig {
        total_shares: total,
        threshold,
    };
    let state = derive_state(secret, config)?;
    let shares = shamir::split(secret, total, threshold, &mut rand::rngs::OsRng)?;
    let (encrypted_shares, plain_shares) = seal_shares(&shares, passwords, &state)?;
    Ok(CreateResult {
        wallet_state: state,
        encrypted_shares,
        plain_shares,
    })
}

/// Holds collected (index, scalar) pairs for one wallet instance and
/// orchestrates signing. Not thread-safe; callers must serialize access.
#[derive(Debug)]
pub struct MpcWallet {
    state: WalletState,
    collected_shares: std::collections::BTreeMap<u8, Scalar>,
}

impl MpcWallet {
    pub fn load_state(state: WalletState) -> Self {
        MpcWallet {
            state,
            collected_shares: std::collections::BTreeMap::new(),
        }
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    /// Opens `encrypted` under `password` and inserts it. Returns `false`
    /// (not an error) on a wrong password, so callers can retry without
    /// learning whether the password or the envelope itself was at
    /// fault.
    pub fn add_share(&mut self, encrypted: &EncryptedShareRecord, password: &[u8]) -> Result<bool> {
        if encrypted.key_id != self.state.key_id {
            return Err(WalletError::WrongWallet);
        }
        if self.collected_shares.contains_key(&encrypted.index) {
            return Err(WalletError::AlreadyCollected);
        }

        let envelope = crate::envelope::EncryptedEnvelope::from_record(&encrypted.encrypted_share)?;
        let Some(opened) = envelope::open(password, &envelope) else {
            return Ok(false);
        };
        let hex_str = std::str::from_utf8(&opened).map_err(|_| WalletError::InvalidScalar)?;
        let scalar = Scalar::from_hex(hex_str)?;
        self.collected_shares.insert(encrypted.index, scalar);
        Ok(true)
    }

    pub fn can_sign(&self) -> bool {
        self.collected_shares.len() >= self.state.config.threshold as usize
    }

    fn reconstruct(&self) -> Result<Scalar> {
        if !self.can_sign() {
            return Err(WalletError::NotEnoughShares);
        }
        let shares: Vec<Share> = self
            .collected_shares
            .iter()
            .map(|(index, value)| Share {
                index: *index,
                value: value.clone(),
            })
            .collect();
        shamir::combine(&shares)
    }

    /// Reconstructs the scalar, signs, zeroizes the scalar, and clears
    /// `collected_shares` — regardless of whether signing succeeded.
    fn with_reconstructed_scalar<T>(
        &mut self,
        f: impl FnOnce(&Scalar) -> Result<T>,
    ) -> Result<T> {
        let mut scalar = self.reconstruct()?;
        let result = f(&scalar);
        scalar.zeroize();
        self.lock();
        result
    }

    pub fn sign_message(&mut self, message: &[u8]) -> Result<Signature> {
        self.with_reconstructed_scalar(|scalar| signer::sign_personal(message, scalar))
    }

    pub fn sign_typed(
        &mut self,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<Signature> {
        self.with_reconstructed_scalar(|scalar| signer::sign_typed(domain_separator, struct_hash, scalar))
    }

    pub fn sign_transaction(&mut self, tx: &Transaction) -> Result<Vec<u8>> {
        self.with_reconstructed_scalar(|scalar| signer::sign_transaction(tx, scalar))
    }

    /// Zeroizes and clears every collected share.
    pub fn lock(&mut self) {
        for (_, scalar) in self.collected_shares.iter_mut() {
            scalar.zeroize();
        }
        self.collected_shares.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("p{}", i + 1).into_bytes()).collect()
    }

    #[test]
    fn mpc_threshold_signing_3_of_5() {
        let pw = passwords(5);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let created = create(5, 3, &pw_refs).unwrap();

        let mut wallet = MpcWallet::load_state(created.wallet_state.clone());
        for idx in [0usize, 2, 4] {
            let ok = wallet
                .add_share(&created.encrypted_shares[idx], &pw[idx])
                .unwrap();
            assert!(ok);
        }
        assert!(wallet.can_sign());

        let sig = wallet.sign_message(b"hi").unwrap();
        let digest = {
            let mut framed = Vec::new();
            framed.extend_from_slice(b"\x19Ethereum Signed Message:\n2hi");
            crate::signer::keccak256(&framed)
        };
        let recovered = signer::recover(&digest, &sig).unwrap();
        let expected_pub = hex::decode(&created.wallet_state.public_key).unwrap();
        assert_eq!(
            recovered.to_encoded_point(false).as_bytes(),
            expected_pub.as_slice()
        );

        assert!(wallet.collected_shares.is_empty());
    }

    #[test]
    fn wrong_password_returns_false_not_error() {
        let pw = passwords(3);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let created = create(3, 2, &pw_refs).unwrap();
        let mut wallet = MpcWallet::load_state(created.wallet_state);
        let ok = wallet
            .add_share(&created.encrypted_shares[0], b"totally wrong")
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn duplicate_index_rejected() {
        let pw = passwords(3);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let created = create(3, 2, &pw_refs).unwrap();
        let mut wallet = MpcWallet::load_state(created.wallet_state);
        wallet.add_share(&created.encrypted_shares[0], &pw[0]).unwrap();
        let err = wallet
            .add_share(&created.encrypted_shares[0], &pw[0])
            .unwrap_err();
        assert_eq!(err, WalletError::AlreadyCollected);
    }

    #[test]
    fn wrong_wallet_key_id_rejected() {
        let pw_a = passwords(3);
        let pw_a_refs: Vec<&[u8]> = pw_a.iter().map(|p| p.as_slice()).collect();
        let wallet_a = create(3, 2, &pw_a_refs).unwrap();

        let pw_b = passwords(3);
        let pw_b_refs: Vec<&[u8]> = pw_b.iter().map(|p| p.as_slice()).collect();
        let wallet_b = create(3, 2, &pw_b_refs).unwrap();

        let mut loaded = MpcWallet::load_state(wallet_a.wallet_state);
        let err = loaded
            .add_share(&wallet_b.encrypted_shares[0], &pw_b[0])
            .unwrap_err();
        assert_eq!(err, WalletError::WrongWallet);
    }

    #[test]
    fn cannot_sign_before_threshold_met() {
        let pw = passwords(3);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let created = create(3, 2, &pw_refs).unwrap();
        let mut wallet = MpcWallet::load_state(created.wallet_state);
        wallet.add_share(&created.encrypted_shares[0], &pw[0]).unwrap();
        assert!(!wallet.can_sign());
        let err = wallet.sign_message(b"hi").unwrap_err();
        assert_eq!(err, WalletError::NotEnoughShares);
    }

    #[test]
    fn import_key_rejects_zero_scalar() {
        let pw = passwords(3);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let err = import_key(&[0u8; 32], 3, 2, &pw_refs).unwrap_err();
        assert_eq!(err, WalletError::InvalidScalar);
    }

    #[test]
    fn config_invalid_threshold_over_total() {
        let pw = passwords(3);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let err = create(3, 4, &pw_refs).unwrap_err();
        assert_eq!(err, WalletError::ConfigInvalid);
    }

    #[test]
    fn password_count_mismatch_rejected() {
        let pw = passwords(2);
        let pw_refs: Vec<&[u8]> = pw.iter().map(|p| p.as_slice()).collect();
        let err = create(3, 2, &pw_refs).unwrap_err();
        assert_eq!(err, WalletError::PasswordCountMismatch);
    }
}
