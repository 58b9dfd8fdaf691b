//! Guardian table and pending invites: the invite/accept challenge that
//! gates a guardian's share before it can be used in recovery.

use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::envelope::EncryptedEnvelope;
use crate::error::{Result, WalletError};
use crate::signer::keccak256;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContactType {
    Email,
    Phone,
    Wallet,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GuardianStatus {
    Pending,
    Accepted,
    Declined,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guardian {
    pub id: String,
    pub name: String,
    pub contact: String,
    pub contact_type: ContactType,
    pub share_index: u8,
    pub status: GuardianStatus,
    pub added_at: i64,
    pub accepted_at: Option<i64>,
    pub verification_hash: Option<[u8; 32]>,
}

/// Transient: lives only until the guardian responds, never persisted
/// as part of facade state.
#[derive(Debug, Clone)]
pub struct GuardianInvite {
    pub id: String,
    pub guardian_id: String,
    pub wallet_address: String,
    pub encrypted_share: EncryptedEnvelope,
    pub verification_code: String,
    pub expires_at: i64,
    pub created_at: i64,
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn random_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap())
        .collect()
}

fn hash_code(code: &str) -> [u8; 32] {
    keccak256(code.as_bytes())
}

pub struct GuardianManager {
    guardians: Vec<Guardian>,
    invites: std::collections::HashMap<String, GuardianInvite>,
}

impl GuardianManager {
    pub fn new() -> Self {
        GuardianManager {
            guardians: Vec::new(),
            invites: std::collections::HashMap::new(),
        }
    }

    /// Creates a pending guardian record plus a transient invite
    /// carrying the plaintext verification code (to be transmitted
    /// out-of-band by the caller) and the encrypted share.
    pub fn create_invite(
        &mut self,
        name: &str,
        contact: &str,
        contact_type: ContactType,
        share_index: u8,
        wallet_address: &str,
        encrypted_share: EncryptedEnvelope,
        now: i64,
        invite_ttl_ms: i64,
    ) -> Result<GuardianInvite> {
        if self.guardians.iter().any(|g| g.share_index == share_index) {
            return Err(WalletError::DuplicateGuardian);
        }

        let code = random_verification_code();
        let guardian_id = random_id();

        let guardian = Guardian {
            id: guardian_id.clone(),
            name: name.to_string(),
            contact: contact.to_string(),
            contact_type,
            share_index,
            status: GuardianStatus::Pending,
            added_at: now,
            accepted_at: None,
            verification_hash: Some(hash_code(&code)),
        };
        self.guardians.push(guardian);

        let invite = GuardianInvite {
            id: random_id(),
            guardian_id,
            wallet_address: wallet_address.to_string(),
            encrypted_share,
            verification_code: code,
            expires_at: now + invite_ttl_ms,
            created_at: now,
        };
        self.invites.insert(invite.id.clone(), invite.clone());
        Ok(invite)
    }

    /// Drops every invite whose `expires_at` has passed. A maintenance
    /// pass, not part of `process_response`'s own expiry check — bulk
    /// pruning here must never swallow the specific `InviteExpired`
    /// error a single lookup is supposed to report.
    pub fn prune_expired(&mut self, now: i64) {
        self.invites.retain(|_, invite| invite.expires_at > now);
    }

    pub fn process_response(
        &mut self,
        invite_id: &str,
        guardian_id: &str,
        accepted: bool,
        verification_code: &str,
        now: i64,
    ) -> Result<()> {
        let invite = self
            .invites
            .get(invite_id)
            .ok_or(WalletError::InviteNotFound)?;
        if invite.guardian_id != guardian_id {
            return Err(WalletError::InviteNotFound);
        }
        if invite.expires_at <= now {
            self.invites.remove(invite_id);
            return Err(WalletError::InviteExpired);
        }

        let guardian = self
            .guardians
            .iter_mut()
            .find(|g| g.id == guardian_id)
            .ok_or(WalletError::GuardianNotFound)?;

        let expected = guardian.verification_hash.ok_or(WalletError::BadCode)?;
        let received = hash_code(verification_code);
        if expected.ct_eq(&received).unwrap_u8() != 1 {
            return Err(WalletError::BadCode);
        }

        guardian.status = if accepted {
            guardian.accepted_at = Some(now);
            GuardianStatus::Accepted
        } else {
            GuardianStatus::Declined
        };

        self.invites.remove(invite_id);
        Ok(())
    }

    pub fn get_all(&self) -> &[Guardian] {
        &self.guardians
    }

    pub fn get_active(&self) -> Vec<&Guardian> {
        self.guardians
            .iter()
            .filter(|g| matches!(g.status, GuardianStatus::Accepted))
            .collect()
    }

    pub fn get_by_share_index(&self, share_index: u8) -> Option<&Guardian> {
        self.guardians.iter().find(|g| g.share_index == share_index)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Guardian> {
        self.guardians.iter().find(|g| g.id == id)
    }

    pub fn has_enough(&self, threshold: usize) -> bool {
        self.get_active().len() >= threshold
    }
}

impl Default for GuardianManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for GuardianInvite {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("GuardianInvite", 7)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("guardianId", &self.guardian_id)?;
        state.serialize_field("walletAddress", &self.wallet_address)?;
        state.serialize_field("encryptedShare", &self.encrypted_share.to_record())?;
        state.serialize_field("verificationCode", &self.verification_code)?;
        state.serialize_field("expiresAt", &self.expires_at)?;
        state.serialize_field("createdAt", &self.created_at)?;
        state.end()
    }
}
