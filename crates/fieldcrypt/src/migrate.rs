//! Upgrading stored envelopes to the current scheme.
//!
//! # Lifecycle
//!
//! 1. [`Migrator::migrate_to_v2`] turns a legacy envelope into a fresh
//!    version-2 envelope and passes current envelopes through untouched.
//! 2. [`Migrator::refresh`] additionally re-encrypts current envelopes that a
//!    [`RotationPolicy`] reports as due.
//!
//! Persisting the result is the caller's job. A background pass over many
//! records must tolerate partial completion: there is no cross-record
//! transaction, and a failure leaves the old envelope as the stored value.

use common::DataClassification;
use tracing::{info, warn};

use crate::cipher::{CipherEngine, Envelope, EnvelopeVersion};
use crate::error::CryptoError;
use crate::rotation::RotationPolicy;

/// Classification reported to the audit log for re-encryptions, which have
/// no caller-supplied classification.
const MIGRATION_CLASSIFICATION: DataClassification = DataClassification::Confidential;

/// Re-encrypts envelopes under the current scheme.
#[derive(Debug, Clone)]
pub struct Migrator {
    engine: CipherEngine,
}

impl Migrator {
    pub fn new(engine: CipherEngine) -> Self {
        Self { engine }
    }

    /// Upgrade a legacy envelope to version 2.
    ///
    /// Current envelopes are returned as an identical clone. Two independent
    /// migrations of one legacy envelope yield different ciphertexts (fresh
    /// nonces) that decrypt to the same plaintext.
    ///
    /// # Errors
    ///
    /// Propagates the same [`CryptoError`] a direct decrypt would return. A
    /// failed migration never yields a placeholder value.
    pub fn migrate_to_v2(&self, envelope: &Envelope) -> Result<Envelope, CryptoError> {
        if envelope.version() >= EnvelopeVersion::Current {
            return Ok(envelope.clone());
        }
        let migrated = self.reseal(envelope).map_err(|e| {
            warn!(error = %e, "legacy envelope migration failed");
            e
        })?;
        info!(from = envelope.version().number(), to = migrated.version().number(), "envelope migrated");
        Ok(migrated)
    }

    /// Migrate legacy envelopes and rotate current ones that `policy` reports
    /// as due.
    ///
    /// Returns `Ok(None)` when `envelope` is already current and fresh.
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::migrate_to_v2`].
    pub fn refresh(
        &self,
        envelope: &Envelope,
        policy: &RotationPolicy,
    ) -> Result<Option<Envelope>, CryptoError> {
        match envelope.version() {
            EnvelopeVersion::Legacy => self.migrate_to_v2(envelope).map(Some),
            EnvelopeVersion::Current if policy.needs_rotation(envelope) => {
                let rotated = self.reseal(envelope)?;
                info!(encrypted_at = %envelope.encrypted_at(), "envelope rotated");
                Ok(Some(rotated))
            }
            EnvelopeVersion::Current => Ok(None),
        }
    }

    fn reseal(&self, envelope: &Envelope) -> Result<Envelope, CryptoError> {
        let plaintext = self.engine.decrypt(envelope, MIGRATION_CLASSIFICATION)?;
        self.engine.encrypt(&plaintext, MIGRATION_CLASSIFICATION)
    }
}
