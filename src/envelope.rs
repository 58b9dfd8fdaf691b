//! Password-based envelope encryption: `scrypt` KDF into an
//! XSalsa20-Poly1305 secret-box.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use scrypt::{scrypt, Params};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, WalletError};

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const CURRENT_VERSION: u8 = 1;

/// scrypt cost parameters: N = 2^18, r = 8, p = 1, 32-byte output.
fn kdf_params() -> Params {
    Params::new(18, 8, 1, KEY_LEN).expect("static scrypt params are always valid")
}

/// A password-sealed blob. `version` lets future KDF/AEAD parameter
/// changes be distinguished from the current scheme without breaking
/// deserialization of envelopes sealed under an older version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub version: u8,
}

/// Derives the symmetric key for `password` under `salt` via scrypt.
/// Returned wrapped in `Zeroizing` so the key bytes are wiped on every
/// return path, error included.
fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<Vec<u8>>> {
    let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
    scrypt(password, salt, &kdf_params(), &mut key).map_err(|_| WalletError::ConfigInvalid)?;
    Ok(key)
}

/// Encrypts `plaintext` under `password`, with a freshly drawn salt and
/// nonce.
pub fn seal(password: &[u8], plaintext: &[u8]) -> Result<EncryptedEnvelope> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt)?;
    let cipher = XSalsa20Poly1305::new_from_slice(&key).map_err(|_| WalletError::ConfigInvalid)?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| WalletError::ConfigInvalid)?;

    Ok(EncryptedEnvelope {
        salt,
        nonce: nonce_bytes,
        ciphertext,
        version: CURRENT_VERSION,
    })
}

/// Attempts to decrypt `envelope` under `password`. Returns `None` on
/// any failure — wrong password, tampered ciphertext, or an unknown
/// version — rather than a `Result`, so callers cannot distinguish
/// "wrong password" from "corrupted data" (an intentional property, not
/// an oversight: either would otherwise leak information about which
/// passwords are "close").
pub fn open(password: &[u8], envelope: &EncryptedEnvelope) -> Option<Zeroizing<Vec<u8>>> {
    if envelope.version != CURRENT_VERSION {
        return None;
    }
    let key = derive_key(password, &envelope.salt).ok()?;
    let cipher = XSalsa20Poly1305::new_from_slice(&key).ok()?;
    let nonce = Nonce::from_slice(&envelope.nonce);
    let plaintext = cipher.decrypt(nonce, envelope.ciphertext.as_ref()).ok()?;
    Some(Zeroizing::new(plaintext))
}

/// Checked variant of `open` for call sites that want to surface
/// `BadVersion` distinctly from a bad password (the version tag itself
/// is not secret, so this doesn't weaken the password/tamper ambiguity).
pub fn open_checked(password: &[u8], envelope: &EncryptedEnvelope) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.version != CURRENT_VERSION {
        return Err(WalletError::BadVersion);
    }
    open(password, envelope).ok_or(WalletError::Undecryptable)
}

/// JSON-safe wire form of an `EncryptedEnvelope`: `{ ciphertext, nonce,
/// salt, version }` with base64-standard-padded string fields, matching
/// the external envelope record format other collaborators parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    pub ciphertext: String,
    pub nonce: String,
    pub salt: String,
    pub version: u8,
}

impl EncryptedEnvelope {
    pub fn to_record(&self) -> EnvelopeRecord {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        EnvelopeRecord {
            ciphertext: STANDARD.encode(&self.ciphertext),
            nonce: STANDARD.encode(self.nonce),
            salt: STANDARD.encode(self.salt),
            version: self.version,
        }
    }

    pub fn from_record(record: &EnvelopeRecord) -> Result<Self> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let ciphertext = STANDARD
            .decode(&record.ciphertext)
            .map_err(|_| WalletError::BadVersion)?;
        let nonce_bytes = STANDARD
            .decode(&record.nonce)
            .map_err(|_| WalletError::BadVersion)?;
        let salt_bytes = STANDARD
            .decode(&record.salt)
            .map_err(|_| WalletError::BadVersion)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| WalletError::BadVersion)?;
        let salt: [u8; SALT_LEN] = salt_bytes.try_into().map_err(|_| WalletError::BadVersion)?;
        Ok(EncryptedEnvelope {
            salt,
            nonce,
            ciphertext,
            version: record.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let password = b"correct horse battery staple";
        let plaintext = b"a secp256k1 scalar or similarly sensitive bytes";
        let envelope = seal(password, plaintext).unwrap();
        let opened = open(password, &envelope).unwrap();
        assert_eq!(&opened[..], plaintext);
    }

    #[test]
    fn wrong_password_fails_without_panic() {
        let envelope = seal(b"right password", b"secret material").unwrap();
        assert!(open(b"wrong password", &envelope).is_none());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut envelope = seal(b"pw", b"secret material").unwrap();
        envelope.ciphertext[0] ^= 0xff;
        assert!(open(b"pw", &envelope).is_none());
    }

    #[test]
    fn unknown_version_rejected() {
        let mut envelope = seal(b"pw", b"secret material").unwrap();
        envelope.version = 99;
        assert!(open(b"pw", &envelope).is_none());
        assert_eq!(
            open_checked(b"pw", &envelope).unwrap_err(),
            WalletError::BadVersion
        );
    }

    #[test]
    fn salts_and_nonces_are_unique_across_seals() {
        let mut salts = std::collections::HashSet::new();
        let mut nonces = std::collections::HashSet::new();
        for _ in 0..32 {
            let envelope = seal(b"pw", b"same plaintext every time").unwrap();
            salts.insert(envelope.salt);
            nonces.insert(envelope.nonce);
        }
        assert_eq!(salts.len(), 32);
        assert_eq!(nonces.len(), 32);
    }

    #[test]
    fn serde_roundtrip_preserves_bytes() {
        let envelope = seal(b"pw", b"json-safe record test").unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        let opened = open(b"pw", &parsed).unwrap();
        assert_eq!(&opened[..], b"json-safe record test");
    }

    #[test]
    fn record_roundtrip_uses_base64_fields() {
        let envelope = seal(b"pw", b"backing up a share").unwrap();
        let record = envelope.to_record();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["ciphertext"].is_string());
        assert!(json["nonce"].is_string());
        assert!(json["salt"].is_string());
        assert_eq!(json["version"], 1);

        let rebuilt = EncryptedEnvelope::from_record(&record).unwrap();
        let opened = open(b"pw", &rebuilt).unwrap();
        assert_eq!(&opened[..], b"backing up a share");
    }

    #[test]
    fn record_decoded_lengths_are_fixed() {
        let plaintext = b"0123456789abcdef";
        let envelope = seal(b"pw", plaintext).unwrap();
        assert_eq!(envelope.salt.len(), SALT_LEN);
        assert_eq!(envelope.nonce.len(), NONCE_LEN);
        assert_eq!(envelope.ciphertext.len(), plaintext.len() + 16);
    }
}
