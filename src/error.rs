//! Error taxonomy for the wallet recovery core.
//!
//! Every variant is a distinct kind a caller can branch on. Decryption
//! failures at the `add_share` / `unlock_owner_shares` boundary are
//! deliberately *not* represented here — those return `bool` so a wrong
//! password can't be distinguished from a tampered envelope.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("threshold/total/owner-share configuration is invalid")]
    ConfigInvalid,

    #[error("password count does not match share count")]
    PasswordCountMismatch,

    #[error("unknown envelope version")]
    BadVersion,

    #[error("decryption failed: wrong password or tampered ciphertext")]
    Undecryptable,

    #[error("combine requires at least two shares")]
    TooFewShares,

    #[error("two shares share the same index")]
    DuplicateIndex,

    #[error("not enough shares collected to sign")]
    NotEnoughShares,

    #[error("share's keyId does not match the loaded wallet state")]
    WrongWallet,

    #[error("a share at this index was already collected")]
    AlreadyCollected,

    #[error("scalar is zero or is not less than the group order")]
    InvalidScalar,

    #[error("guardian invite not found")]
    InviteNotFound,

    #[error("guardian invite has expired")]
    InviteExpired,

    #[error("verification code does not match")]
    BadCode,

    #[error("a non-terminal recovery request already exists for this wallet")]
    AlreadyPending,

    #[error("recovery initiation is in cooldown")]
    Cooldown,

    #[error("recovery request is not in a state that allows this operation")]
    InvalidState,

    #[error("this guardian has already approved this request")]
    DuplicateGuardian,

    #[error("guardian not found")]
    GuardianNotFound,

    #[error("recovery request not found")]
    RequestNotFound,

    #[error("signing operation failed")]
    SigningFailed,
}

pub type Result<T> = core::result::Result<T, WalletError>;
