//! Durable storage shapes for encrypted values.
//!
//! [`StoredEnvelope`] is the JSON contract with storage. Any change here must
//! keep envelopes written under the previous shape readable.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record key that carries [`EncryptionMetadata`] inside a classified record.
pub const ENCRYPTION_METADATA_KEY: &str = "_encryption";

/// Sensitivity tier attached to a value at encryption time.
///
/// Forwarded to audit logging only; it does not select a key or algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl DataClassification {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown classification name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data classification: {0}")]
pub struct UnknownClassification(pub String);

impl FromStr for DataClassification {
    type Err = UnknownClassification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(DataClassification::Public),
            "internal" => Ok(DataClassification::Internal),
            "confidential" => Ok(DataClassification::Confidential),
            "restricted" => Ok(DataClassification::Restricted),
            _ => Err(UnknownClassification(s.to_owned())),
        }
    }
}

/// Wire form of an encrypted value.
///
/// ```text
/// { "ciphertext": hex, "iv": hex, "authTag": hex?, "encryptionVersion": 1|2, "encryptedAt": ISO-8601 }
/// ```
///
/// Fields are raw strings; structural validation happens when the core crate
/// converts this into its validated envelope type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEnvelope {
    /// Hex-encoded ciphertext bytes.
    pub ciphertext: String,
    /// Hex-encoded nonce (12 bytes) or legacy IV (16 bytes).
    pub iv: String,
    /// Hex-encoded 16-byte authentication tag. Absent on legacy envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,
    /// `1` = legacy, `2` = current.
    pub encryption_version: u32,
    /// Creation time.
    pub encrypted_at: DateTime<Utc>,
}

impl StoredEnvelope {
    /// Returns `true` if `value` is a JSON object shaped like a stored envelope.
    pub fn looks_like(value: &serde_json::Value) -> bool {
        match value.as_object() {
            Some(map) => {
                map.get("ciphertext").is_some_and(|v| v.is_string())
                    && map.get("iv").is_some_and(|v| v.is_string())
                    && map.get("encryptionVersion").is_some_and(|v| v.is_u64())
            }
            None => false,
        }
    }
}

/// Marker attached to a record by the field classifier under
/// [`ENCRYPTION_METADATA_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    /// Always `true` on records produced by the classifier.
    pub encrypted: bool,
    pub encrypted_at: DateTime<Utc>,
    /// Logical record type the allow-list was chosen by (e.g. `"user"`).
    pub data_type: String,
    /// Algorithm name of the write path, e.g. `"aes-256-gcm"`.
    pub algorithm: String,
    /// Label of the master key in use when the record was written.
    pub key_version: u32,
}
