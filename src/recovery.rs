//! State machine for guardian-approved recovery requests: pending →
//! approved → ready → executed, with cancellation and expiry as
//! terminal side exits and a per-wallet cooldown between initiations.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Result, WalletError};
use crate::field::Scalar;
use crate::shamir::{self, Share};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Ready,
    Executed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianApproval {
    pub guardian_id: String,
    pub share_index: u8,
    pub share_value_hex: String,
    pub approved_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub id: String,
    pub wallet_address: String,
    pub key_id: String,
    pub initiator: String,
    pub reason: String,
    pub status: RequestStatus,
    pub threshold: u8,
    pub approvals: Vec<GuardianApproval>,
    pub timelock_ms: i64,
    pub created_at: i64,
    pub approved_at: Option<i64>,
    pub timelock_expires_at: Option<i64>,
    pub expires_at: i64,
    pub executed_at: Option<i64>,
    pub recovered_secret_hex: Option<String>,
}

pub struct InitiateParams<'a> {
    pub wallet_address: &'a str,
    pub key_id: &'a str,
    pub initiator: &'a str,
    pub reason: &'a str,
    pub threshold: u8,
    pub timelock_ms: i64,
    pub expiration_ms: i64,
    pub cooldown_ms: i64,
}

fn random_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_terminal(status: RequestStatus) -> bool {
    matches!(
        status,
        RequestStatus::Executed | RequestStatus::Cancelled | RequestStatus::Expired
    )
}

pub struct RecoveryCoordinator {
    requests: std::collections::HashMap<String, RecoveryRequest>,
    last_attempt_at: std::collections::HashMap<String, i64>,
}

impl RecoveryCoordinator {
    pub fn new() -> Self {
        RecoveryCoordinator {
            requests: std::collections::HashMap::new(),
            last_attempt_at: std::collections::HashMap::new(),
        }
    }

    /// Lazy projection applied before every status-dependent read or
    /// transition: expiry first, then timelock-elapsed.
    fn update_status(request: &mut RecoveryRequest, now: i64) {
        if now > request.expires_at && !is_terminal(request.status) {
            request.status = RequestStatus::Expired;
            log::info!(
                "recovery request {} ({}) expired",
                request.id,
                request.wallet_address
            );
            return;
        }
        if request.status == RequestStatus::Approved {
            if let Some(timelock_expires_at) = request.timelock_expires_at {
                if now >= timelock_expires_at {
                    request.status = RequestStatus::Ready;
                    log::info!(
                        "recovery request {} ({}) timelock elapsed, now ready",
                        request.id,
                        request.wallet_address
                    );
                }
            }
        }
    }

    pub fn initiate(&mut self, params: InitiateParams, now: i64) -> Result<RecoveryRequest> {
        let last = self
            .last_attempt_at
            .get(params.wallet_address)
            .copied()
            .unwrap_or(i64::MIN);
        if now - last < params.cooldown_ms {
            return Err(WalletError::Cooldown);
        }

        if self.get_pending_request(params.wallet_address, now).is_some() {
            return Err(WalletError::AlreadyPending);
        }

        let request = RecoveryRequest {
            id: random_request_id(),
            wallet_address: params.wallet_address.to_string(),
            key_id: params.key_id.to_string(),
            initiator: params.initiator.to_string(),
            reason: params.reason.to_string(),
            status: RequestStatus::Pending,
            threshold: params.threshold,
            approvals: Vec::new(),
            timelock_ms: params.timelock_ms,
            created_at: now,
            approved_at: None,
            timelock_expires_at: None,
            expires_at: now + params.expiration_ms,
            executed_at: None,
            recovered_secret_hex: None,
        };

        self.last_attempt_at
            .insert(params.wallet_address.to_string(), now);
        self.requests.insert(request.id.clone(), request.clone());
        log::info!(
            "recovery request {} ({}) initiated by {}",
            request.id,
            request.wallet_address,
            request.initiator
        );
        Ok(request)
    }

    pub fn add_approval(
        &mut self,
        request_id: &str,
        guardian_id: &str,
        share_index: u8,
        share_value_hex: &str,
        now: i64,
    ) -> Result<RecoveryRequest> {
        // Validate early: a malformed scalar should not mutate state.
        let mut bytes = [0u8; 32];
        let decoded = hex::decode(share_value_hex).map_err(|_| WalletError::InvalidScalar)?;
        if decoded.len() != 32 {
            return Err(WalletError::InvalidScalar);
        }
        bytes.copy_from_slice(&decoded);
        Scalar::from_bytes(&bytes)?;

        let request = self
            .requests
            .get_mut(request_id)
            .ok_or(WalletError::RequestNotFound)?;
        Self::update_status(request, now);

        if !matches!(request.status, RequestStatus::Pending | RequestStatus::Approved) {
            return Err(WalletError::InvalidState);
        }
        if request
            .approvals
            .iter()
            .any(|a| a.guardian_id == guardian_id)
        {
            return Err(WalletError::DuplicateGuardian);
        }

        request.approvals.push(GuardianApproval {
            guardian_id: guardian_id.to_string(),
            share_index,
            share_value_hex: share_value_hex.to_string(),
            approved_at: now,
        });

        if request.status == RequestStatus::Pending
            && request.approvals.len() >= request.threshold as usize
        {
            request.status = RequestStatus::Approved;
            request.approved_at = Some(now);
            request.timelock_expires_at = Some(now + request.timelock_ms);
            log::info!(
                "recovery request {} ({}) reached approval threshold",
                request.id,
                request.wallet_address
            );
        }

        Ok(request.clone())
    }

    pub fn execute(&mut self, request_id: &str, now: i64) -> Result<String> {
        let request = self
            .requests
            .get_mut(request_id)
            .ok_or(WalletError::RequestNotFound)?;
        Self::update_status(request, now);

        if request.status != RequestStatus::Ready {
            return Err(WalletError::InvalidState);
        }

        let shares: Result<Vec<Share>> = request
            .approvals
            .iter()
            .map(|approval| {
                let mut bytes = [0u8; 32];
                let decoded = hex::decode(&approval.share_value_hex)
                    .map_err(|_| WalletError::InvalidScalar)?;
                bytes.copy_from_slice(&decoded);
                let value = Scalar::from_bytes(&bytes)?;
                Ok(Share {
                    index: approval.share_index,
                    value,
                })
            })
            .collect();
        let secret = shamir::combine(&shares?)?;

        let secret_hex = secret.to_hex();
        request.recovered_secret_hex = Some(secret_hex.clone());
        request.executed_at = Some(now);
        request.status = RequestStatus::Executed;
        log::info!(
            "recovery request {} ({}) executed",
            request.id,
            request.wallet_address
        );

        Ok(secret_hex)
    }

    pub fn cancel(&mut self, request_id: &str, now: i64) -> Result<()> {
        let request = self
            .requests
            .get_mut(request_id)
            .ok_or(WalletError::RequestNotFound)?;
        Self::update_status(request, now);

        if !matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::Approved | RequestStatus::Ready
        ) {
            return Err(WalletError::InvalidState);
        }

        request.status = RequestStatus::Cancelled;
        for approval in request.approvals.iter_mut() {
            approval.share_value_hex.zeroize();
            approval.share_value_hex = "0".repeat(64);
        }
        log::info!(
            "recovery request {} ({}) cancelled",
            request.id,
            request.wallet_address
        );
        Ok(())
    }

    pub fn get_request(&mut self, request_id: &str, now: i64) -> Option<RecoveryRequest> {
        let request = self.requests.get_mut(request_id)?;
        Self::update_status(request, now);
        Some(request.clone())
    }

    pub fn get_pending_request(&mut self, wallet_address: &str, now: i64) -> Option<RecoveryRequest> {
        let ids: Vec<String> = self
            .requests
            .values()
            .filter(|r| r.wallet_address == wallet_address)
            .map(|r| r.id.clone())
            .collect();
        for id in ids {
            if let Some(request) = self.requests.get_mut(&id) {
                Self::update_status(request, now);
                if !is_terminal(request.status) {
                    return Some(request.clone());
                }
            }
        }
        None
    }

    pub fn approval_progress(&mut self, request_id: &str, now: i64) -> Option<(usize, usize, f64)> {
        let request = self.get_request(request_id, now)?;
        let current = request.approvals.len();
        let required = request.threshold as usize;
        let percentage = if required == 0 {
            100.0
        } else {
            (current as f64 / required as f64) * 100.0
        };
        Some((current, required, percentage))
    }

    pub fn timelock_remaining(&mut self, request_id: &str, now: i64) -> Option<i64> {
        let request = self.get_request(request_id, now)?;
        request.timelock_expires_at.map(|t| (t - now).max(0))
    }
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(addr: &str) -> InitiateParams {
        InitiateParams {
            wallet_address: addr,
            key_id: "key1",
            initiator: "owner",
            reason: "lost device",
            threshold: 2,
            timelock_ms: 1_000,
            expiration_ms: 100_000,
            cooldown_ms: 5_000,
        }
    }

    fn share_hex(byte: u8) -> String {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        hex::encode(bytes)
    }

    #[test]
    fn recovery_happy_path_pending_to_executed() {
        let mut coord = RecoveryCoordinator::new();
        let request = coord.initiate(params("0xabc"), 0).unwrap();

        coord
            .add_approval(&request.id, "g1", 2, &share_hex(10), 10)
            .unwrap();
        let approved = coord
            .add_approval(&request.id, "g2", 4, &share_hex(20), 20)
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);

        // Before timelock elapses, still approved.
        let still_approved = coord.get_request(&request.id, 500).unwrap();
        assert_eq!(still_approved.status, RequestStatus::Approved);

        let ready = coord.get_request(&request.id, 1_100).unwrap();
        assert_eq!(ready.status, RequestStatus::Ready);

        let secret_hex = coord.execute(&request.id, 1_200).unwrap();
        assert!(!secret_hex.is_empty());

        let executed = coord.get_request(&request.id, 1_300).unwrap();
        assert_eq!(executed.status, RequestStatus::Executed);
    }

    #[test]
    fn cancellation_zeroes_share_values() {
        let mut coord = RecoveryCoordinator::new();
        let request = coord.initiate(params("0xdef"), 0).unwrap();
        coord
            .add_approval(&request.id, "g1", 2, &share_hex(10), 10)
            .unwrap();

        coord.cancel(&request.id, 50).unwrap();
        let cancelled = coord.get_request(&request.id, 60).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(cancelled
            .approvals
            .iter()
            .all(|a| a.share_value_hex == "0".repeat(64)));
    }

    #[test]
    fn no_double_approval_from_same_guardian() {
        let mut coord = RecoveryCoordinator::new();
        let request = coord.initiate(params("0x111"), 0).unwrap();
        coord
            .add_approval(&request.id, "g1", 2, &share_hex(1), 0)
            .unwrap();
        let err = coord
            .add_approval(&request.id, "g1", 2, &share_hex(1), 0)
            .unwrap_err();
        assert_eq!(err, WalletError::DuplicateGuardian);
    }

    #[test]
    fn cooldown_blocks_reinitiation() {
        let mut coord = RecoveryCoordinator::new();
        coord.initiate(params("0x222"), 0).unwrap();
        coord.cancel(
            &coord.get_pending_request("0x222", 0).unwrap().id,
            0,
        )
        .unwrap();

        let err = coord.initiate(params("0x222"), 100).unwrap_err();
        assert_eq!(err, WalletError::Cooldown);

        let ok = coord.initiate(params("0x222"), 5_000);
        assert!(ok.is_ok());
    }

    #[test]
    fn already_pending_blocks_second_request() {
        let mut coord = RecoveryCoordinator::new();
        coord.initiate(params("0x333"), 0).unwrap();
        let err = coord.initiate(params("0x333"), 0).unwrap_err();
        assert_eq!(err, WalletError::AlreadyPending);
    }

    #[test]
    fn expired_request_rejects_further_approvals() {
        let mut coord = RecoveryCoordinator::new();
        let mut short_params = params("0x444");
        short_params.expiration_ms = 10;
        let request = coord.initiate(short_params, 0).unwrap();
        let err = coord
            .add_approval(&request.id, "g1", 2, &share_hex(1), 100)
            .unwrap_err();
        assert_eq!(err, WalletError::InvalidState);
    }

    #[test]
    fn invalid_scalar_in_approval_rejected() {
        let mut coord = RecoveryCoordinator::new();
        let request = coord.initiate(params("0x555"), 0).unwrap();
        let err = coord
            .add_approval(&request.id, "g1", 2, "not-hex-at-all", 0)
            .unwrap_err();
        assert_eq!(err, WalletError::InvalidScalar);
    }

    #[test]
    fn execute_before_ready_rejected() {
        let mut coord = RecoveryCoordinator::new();
        let request = coord.initiate(params("0x666"), 0).unwrap();
        let err = coord.execute(&request.id, 0).unwrap_err();
        assert_eq!(err, WalletError::InvalidState);
    }
}
