//! Cryptographic core for a self-custodial social-recovery wallet.
//!
//! - Shamir Secret Sharing over the secp256k1 scalar field
//! - Password-based envelope encryption (scrypt + XSalsa20-Poly1305)
//! - secp256k1 ECDSA signing with low-S normalization and message framing
//! - Guardian-approved recovery, modeled as an explicit state machine
//!
//! UI flows, storage engines, chain registries, RPC clients, and
//! broadcasting are external collaborators; this crate exposes only the
//! interfaces they call.

pub mod envelope;
pub mod error;
pub mod facade;
pub mod field;
pub mod guardian;
pub mod recovery;
pub mod rlp;
pub mod shamir;
pub mod signer;
pub mod wallet;

pub use error::{Result, WalletError};
pub use facade::{FacadeConfig, GuardianDescriptor, SetupResult, SocialRecoveryWallet};
