//! Master key resolution.
//!
//! The cipher layer never reads configuration itself. A [`KeyProvider`] is
//! constructed once at startup and injected into
//! [`CipherEngine`](crate::cipher::CipherEngine), so tests can substitute a
//! double and nothing depends on process-wide state.
//!
//! # Security invariants
//!
//! - The plaintext key is **never** written to disk, logged, or embedded in an
//!   envelope.
//! - There is no set/rotate API. Physical key rotation is a redeploy; logical
//!   rotation (re-encrypting data) is the [`Migrator`](crate::migrate::Migrator)'s job.

pub mod master;
pub mod provider;

pub use master::{MasterKey, KEY_LEN};
pub use provider::{HexKeyProvider, DEFAULT_KEY_ENV};

use thiserror::Error;

/// Errors produced while resolving the master key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The configuration source holds no key.
    #[error("{0} is not set")]
    Missing(String),

    /// The configured value is not valid hex.
    #[error("encryption key is not valid hex")]
    InvalidEncoding,

    /// The decoded key has the wrong length.
    #[error("encryption key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Source of the single symmetric master key.
///
/// Implementations must be `Send + Sync`: one provider is shared by every
/// concurrent encrypt/decrypt call.
#[cfg_attr(test, mockall::automock)]
pub trait KeyProvider: Send + Sync {
    /// Return the current master key.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the key is absent or malformed.
    fn master_key(&self) -> Result<MasterKey, KeyError>;

    /// Label of the key returned by [`KeyProvider::master_key`], recorded in
    /// classified-record metadata.
    fn key_version(&self) -> u32 {
        1
    }
}
