//! Error taxonomy of the encryption subsystem.

use common::ServiceError;
use thiserror::Error;

use crate::cipher::envelope::EnvelopeError;
use crate::key::KeyError;

/// Errors returned by the cipher engine, migrator and field classifier.
///
/// [`CryptoError::Decryption`] is intentionally opaque: it never says whether
/// the tag, the IV or the ciphertext was at fault.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The master key is absent or malformed.
    #[error("encryption key unavailable: {0}")]
    MissingKey(#[from] KeyError),

    /// The envelope failed structural validation.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    /// Authentication or legacy decoding failed.
    #[error("decryption failed")]
    Decryption,

    /// The envelope's version is neither legacy nor current.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    /// The AEAD write path failed. Unreachable with a valid key.
    #[error("encryption failed")]
    Encryption,
}

impl From<EnvelopeError> for CryptoError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::UnsupportedVersion(v) => CryptoError::UnsupportedVersion(v),
            EnvelopeError::Malformed(reason) => CryptoError::MalformedEnvelope(reason),
        }
    }
}

impl From<CryptoError> for ServiceError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MissingKey(_) => ServiceError::Unavailable("encryption key unavailable".into()),
            CryptoError::MalformedEnvelope(_) | CryptoError::UnsupportedVersion(_) => {
                ServiceError::BadRequest(err.to_string())
            }
            CryptoError::Decryption => ServiceError::DecryptionFailure,
            CryptoError::Encryption => ServiceError::Internal("encryption failed".into()),
        }
    }
}
