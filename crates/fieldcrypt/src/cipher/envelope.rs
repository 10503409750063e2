//! Validated, immutable envelope and its closed version type.
//!
//! [`StoredEnvelope`] is what storage hands back: loose hex strings and a bare
//! integer version. Converting it into an [`Envelope`] checks the version first
//! (so an unknown version never reaches a cipher), then decodes and
//! length-checks every component.

use chrono::{DateTime, Utc};
use common::StoredEnvelope;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Byte length of a legacy CBC IV (16 bytes = 128 bits).
pub const LEGACY_IV_LEN: usize = 16;

const LEGACY_BLOCK_LEN: usize = 16;

/// Errors from envelope validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    #[error("malformed envelope: {0}")]
    Malformed(&'static str),
}

/// Envelope format version.
///
/// Closed on purpose: only these two values can be constructed or matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvelopeVersion {
    /// `1`: AES-256-CBC, no authentication. Read-only.
    Legacy,
    /// `2`: AES-256-GCM.
    Current,
}

impl EnvelopeVersion {
    /// Numeric wire value.
    pub const fn number(self) -> u32 {
        match self {
            EnvelopeVersion::Legacy => 1,
            EnvelopeVersion::Current => 2,
        }
    }

    /// Parse a wire value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::UnsupportedVersion`] for anything but `1` or `2`.
    pub fn from_number(n: u32) -> Result<Self, EnvelopeError> {
        match n {
            1 => Ok(EnvelopeVersion::Legacy),
            2 => Ok(EnvelopeVersion::Current),
            other => Err(EnvelopeError::UnsupportedVersion(other)),
        }
    }
}

/// Per-version sealing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Seal {
    Legacy { iv: [u8; LEGACY_IV_LEN] },
    Current { nonce: [u8; NONCE_LEN], tag: [u8; TAG_LEN] },
}

/// An encrypted value plus everything needed to decrypt it, except the key.
///
/// Only the cipher engine creates envelopes, and it only ever creates
/// [`EnvelopeVersion::Current`] ones. Legacy envelopes exist solely by parsing
/// stored data. Serializes as [`StoredEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredEnvelope", into = "StoredEnvelope")]
pub struct Envelope {
    ciphertext: Vec<u8>,
    seal: Seal,
    encrypted_at: DateTime<Utc>,
}

impl Envelope {
    pub(crate) fn current(
        ciphertext: Vec<u8>,
        nonce: [u8; NONCE_LEN],
        tag: [u8; TAG_LEN],
        encrypted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ciphertext,
            seal: Seal::Current { nonce, tag },
            encrypted_at,
        }
    }

    pub(crate) fn seal(&self) -> &Seal {
        &self.seal
    }

    /// Format version; selects the decrypt algorithm.
    pub fn version(&self) -> EnvelopeVersion {
        match self.seal {
            Seal::Legacy { .. } => EnvelopeVersion::Legacy,
            Seal::Current { .. } => EnvelopeVersion::Current,
        }
    }

    /// When this envelope was produced.
    pub fn encrypted_at(&self) -> DateTime<Utc> {
        self.encrypted_at
    }

    /// Raw ciphertext bytes.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Nonce (current) or IV (legacy) bytes.
    pub fn iv(&self) -> &[u8] {
        match &self.seal {
            Seal::Legacy { iv } => iv.as_slice(),
            Seal::Current { nonce, .. } => nonce.as_slice(),
        }
    }

    /// Authentication tag; `None` for legacy envelopes.
    pub fn auth_tag(&self) -> Option<&[u8; TAG_LEN]> {
        match &self.seal {
            Seal::Legacy { .. } => None,
            Seal::Current { tag, .. } => Some(tag),
        }
    }

    /// Wire form for persistence.
    pub fn to_stored(&self) -> StoredEnvelope {
        StoredEnvelope {
            ciphertext: hex::encode(&self.ciphertext),
            iv: hex::encode(self.iv()),
            auth_tag: self.auth_tag().map(hex::encode),
            encryption_version: self.version().number(),
            encrypted_at: self.encrypted_at,
        }
    }
}

impl TryFrom<&StoredEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(stored: &StoredEnvelope) -> Result<Self, Self::Error> {
        let version = EnvelopeVersion::from_number(stored.encryption_version)?;
        let ciphertext = decode_hex(&stored.ciphertext, "ciphertext is not valid hex")?;

        let seal = match version {
            EnvelopeVersion::Legacy => {
                // The tag, if a writer left one behind, is ignored for legacy.
                if ciphertext.is_empty() || ciphertext.len() % LEGACY_BLOCK_LEN != 0 {
                    return Err(EnvelopeError::Malformed(
                        "legacy ciphertext must be a non-empty multiple of 16 bytes",
                    ));
                }
                Seal::Legacy {
                    iv: decode_fixed(&stored.iv, "iv must be 16 bytes of hex")?,
                }
            }
            EnvelopeVersion::Current => {
                let tag = stored
                    .auth_tag
                    .as_deref()
                    .ok_or(EnvelopeError::Malformed("authTag is required for version 2"))?;
                Seal::Current {
                    nonce: decode_fixed(&stored.iv, "iv must be 12 bytes of hex")?,
                    tag: decode_fixed(tag, "authTag must be 16 bytes of hex")?,
                }
            }
        };

        Ok(Self {
            ciphertext,
            seal,
            encrypted_at: stored.encrypted_at,
        })
    }
}

impl TryFrom<StoredEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(stored: StoredEnvelope) -> Result<Self, Self::Error> {
        Envelope::try_from(&stored)
    }
}

impl From<Envelope> for StoredEnvelope {
    fn from(envelope: Envelope) -> Self {
        envelope.to_stored()
    }
}

fn decode_hex(encoded: &str, reason: &'static str) -> Result<Vec<u8>, EnvelopeError> {
    hex::decode(encoded).map_err(|_| EnvelopeError::Malformed(reason))
}

fn decode_fixed<const N: usize>(encoded: &str, reason: &'static str) -> Result<[u8; N], EnvelopeError> {
    decode_hex(encoded, reason)?
        .try_into()
        .map_err(|_| EnvelopeError::Malformed(reason))
}
