//! Composes the envelope cipher, MPC wallet, guardian manager, and
//! recovery coordinator into the one surface external collaborators
//! (UI, storage, chain tooling) actually call.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::field::Scalar;
use crate::guardian::{ContactType, GuardianInvite, GuardianManager};
use crate::recovery::{InitiateParams, RecoveryCoordinator, RecoveryRequest};
use crate::wallet::{CreateResult, EncryptedShareRecord, MpcWallet, PlainShareRecord, WalletState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacadeConfig {
    pub total_shares: u8,
    pub threshold: u8,
    pub owner_shares: u8,
    pub timelock_ms: i64,
    pub expiration_ms: i64,
}

impl FacadeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold < 2
            || self.owner_shares < 1
            || self.total_shares < self.threshold
            || self.owner_shares > self.total_shares.saturating_sub(1)
        {
            return Err(WalletError::ConfigInvalid);
        }
        let guardian_shares = self.total_shares - self.owner_shares;
        let guardian_needed = self.threshold.saturating_sub(self.owner_shares);
        if guardian_shares < guardian_needed {
            return Err(WalletError::ConfigInvalid);
        }
        Ok(())
    }
}

pub struct GuardianDescriptor<'a> {
    pub name: &'a str,
    pub contact: &'a str,
    pub contact_type: ContactType,
    pub share_password: &'a [u8],
}

pub struct SetupResult {
    pub wallet_state: WalletState,
    pub guardian_invites: Vec<GuardianInvite>,
    pub owner_plain_shares: Vec<PlainShareRecord>,
}

/// Binds C3 (envelopes are produced inside `wallet::create`), C5 (the
/// MPC wallet), C6 (guardian invites), and C7 (recovery) under one
/// configuration.
pub struct SocialRecoveryWallet {
    config: FacadeConfig,
    wallet: Option<MpcWallet>,
    owner_share_indices: Vec<u8>,
    guardians: GuardianManager,
    recovery: RecoveryCoordinator,
}

impl SocialRecoveryWallet {
    pub fn new(config: FacadeConfig) -> Result<Self> {
        config.validate()?;
        Ok(SocialRecoveryWallet {
            config,
            wallet: None,
            owner_share_indices: Vec::new(),
            guardians: GuardianManager::new(),
            recovery: RecoveryCoordinator::new(),
        })
    }

    /// Generates a fresh wallet and distributes its shares: the first
    /// `owner_shares` are kept by the owner (password repeated), the
    /// rest become guardian invites.
    pub fn setup(
        &mut self,
        owner_password: &[u8],
        guardian_descriptors: &[GuardianDescriptor],
        now: i64,
        invite_ttl_ms: i64,
    ) -> Result<SetupResult> {
        if guardian_descriptors.len() != (self.config.total_shares - self.config.owner_shares) as usize {
            return Err(WalletError::ConfigInvalid);
        }

        let mut passwords: Vec<&[u8]> = Vec::with_capacity(self.config.total_shares as usize);
        for _ in 0..self.config.owner_shares {
            passwords.push(owner_password);
        }
        for descriptor in guardian_descriptors {
            passwords.push(descriptor.share_password);
        }

        let created: CreateResult = crate::wallet::create(
            self.config.total_shares,
            self.config.threshold,
            &passwords,
        )?;

        let owner_count = self.config.owner_shares as usize;
        let owner_plain_shares = created.plain_shares[..owner_count].to_vec();
        self.owner_share_indices = owner_plain_shares.iter().map(|s| s.index).collect();

        let mut guardian_invites = Vec::with_capacity(guardian_descriptors.len());
        for (descriptor, record) in guardian_descriptors
            .iter()
            .zip(created.encrypted_shares[owner_count..].iter())
        {
            let invite = self.guardians.create_invite(
                descriptor.name,
                descriptor.contact,
                descriptor.contact_type,
                record.index,
                &created.wallet_state.address,
                crate::envelope::EncryptedEnvelope::from_record(&record.encrypted_share)?,
                now,
                invite_ttl_ms,
            )?;
            guardian_invites.push(invite);
        }

        self.wallet = Some(MpcWallet::load_state(created.wallet_state.clone()));

        Ok(SetupResult {
            wallet_state: created.wallet_state,
            guardian_invites,
            owner_plain_shares,
        })
    }

    fn wallet_mut(&mut self) -> Result<&mut MpcWallet> {
        self.wallet.as_mut().ok_or(WalletError::ConfigInvalid)
    }

    pub fn wallet_state(&self) -> Option<&WalletState> {
        self.wallet.as_ref().map(|w| w.state())
    }

    /// Opens every owner-held encrypted share under one password and
    /// feeds them into the MPC wallet. Assumes a single password
    /// protects all owner shares.
    pub fn unlock_owner_shares(
        &mut self,
        owner_shares: &[EncryptedShareRecord],
        password: &[u8],
    ) -> Result<bool> {
        let wallet = self.wallet_mut()?;
        let mut all_ok = true;
        for record in owner_shares {
            let ok = wallet.add_share(record, password)?;
            all_ok &= ok;
        }
        Ok(all_ok)
    }

    pub fn add_guardian_share(
        &mut self,
        record: &EncryptedShareRecord,
        password: &[u8],
    ) -> Result<bool> {
        self.wallet_mut()?.add_share(record, password)
    }

    pub fn can_sign(&self) -> bool {
        self.wallet.as_ref().map(|w| w.can_sign()).unwrap_or(false)
    }

    pub fn sign_message(&mut self, message: &[u8]) -> Result<crate::signer::Signature> {
        self.wallet_mut()?.sign_message(message)
    }

    pub fn sign_typed(
        &mut self,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<crate::signer::Signature> {
        self.wallet_mut()?.sign_typed(domain_separator, struct_hash)
    }

    pub fn sign_transaction(&mut self, tx: &crate::rlp::Transaction) -> Result<Vec<u8>> {
        self.wallet_mut()?.sign_transaction(tx)
    }

    pub fn guardians(&self) -> &GuardianManager {
        &self.guardians
    }

    pub fn guardians_mut(&mut self) -> &mut GuardianManager {
        &mut self.guardians
    }

    pub fn initiate_recovery(
        &mut self,
        initiator: &str,
        reason: &str,
        now: i64,
        cooldown_ms: i64,
    ) -> Result<RecoveryRequest> {
        let state = self.wallet_state().ok_or(WalletError::ConfigInvalid)?.clone();
        self.recovery.initiate(
            InitiateParams {
                wallet_address: &state.address,
                key_id: &state.key_id,
                initiator,
                reason,
                threshold: self.config.threshold,
                timelock_ms: self.config.timelock_ms,
                expiration_ms: self.config.expiration_ms,
                cooldown_ms,
            },
            now,
        )
    }

    /// Looks up the guardian by id and forwards their `share_index`
    /// alongside the supplied plaintext share value.
    pub fn add_recovery_approval(
        &mut self,
        request_id: &str,
        guardian_id: &str,
        share_value_hex: &str,
        now: i64,
    ) -> Result<RecoveryRequest> {
        let guardian = self
            .guardians
            .get_by_id(guardian_id)
            .ok_or(WalletError::GuardianNotFound)?;
        let share_index = guardian.share_index;
        self.recovery
            .add_approval(request_id, guardian_id, share_index, share_value_hex, now)
    }

    pub fn execute_recovery(&mut self, request_id: &str, now: i64) -> Result<Scalar> {
        let hex = self.recovery.execute(request_id, now)?;
        let mut bytes = [0u8; 32];
        let decoded = hex::decode(&hex).map_err(|_| WalletError::InvalidScalar)?;
        bytes.copy_from_slice(&decoded);
        Scalar::from_bytes(&bytes)
    }

    pub fn cancel_recovery(&mut self, request_id: &str, now: i64) -> Result<()> {
        self.recovery.cancel(request_id, now)
    }

    pub fn get_recovery_request(&mut self, request_id: &str, now: i64) -> Option<RecoveryRequest> {
        self.recovery.get_request(request_id, now)
    }
}
