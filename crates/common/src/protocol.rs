//! Request and response types for the `fieldcrypt-svc` HTTP API.
//!
//! All bodies are JSON with camelCase keys so they line up with the stored
//! envelope format.

use serde::{Deserialize, Serialize};

use crate::envelope::{DataClassification, StoredEnvelope};

// ---------------------------------------------------------------------------
// Single values
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptValueRequest {
    /// Plaintext to encrypt.
    pub value: String,
    pub classification: DataClassification,
}

/// Response body for `POST /v1/encrypt` and `POST /v1/migrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeResponse {
    pub envelope: StoredEnvelope,
    /// `true` when a new envelope was produced from an older one.
    #[serde(default)]
    pub reencrypted: bool,
}

/// Request body for `POST /v1/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptValueRequest {
    pub envelope: StoredEnvelope,
    pub classification: DataClassification,
}

/// Response body for `POST /v1/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptValueResponse {
    pub value: String,
}

/// Request body for `POST /v1/migrate` and `POST /v1/rotation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    pub envelope: StoredEnvelope,
}

/// Response body for `POST /v1/rotation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResponse {
    pub needs_rotation: bool,
}

/// Request body for `POST /v1/index-hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHashRequest {
    pub value: String,
}

/// Response body for `POST /v1/index-hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHashResponse {
    /// Lowercase hex digest.
    pub digest: String,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/records/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRecordRequest {
    /// JSON object whose sensitive top-level fields will be encrypted.
    pub record: serde_json::Value,
    /// Logical record type used to pick an allow-list (e.g. `"user"`).
    pub data_type: String,
}

/// Request body for `POST /v1/records/decrypt` and `POST /v1/records/migrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    pub record: serde_json::Value,
}

/// Response body for record endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub record: serde_json::Value,
    /// Fields left in envelope form because they could not be decrypted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub still_encrypted: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the master key resolves.
    pub key_ready: bool,
    /// Number of record types with an explicit allow-list.
    pub record_types: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encrypt_request_reads_classification() {
        let req: EncryptValueRequest =
            serde_json::from_value(json!({"value": "123-45-6789", "classification": "restricted"}))
                .unwrap();
        assert_eq!(req.classification, DataClassification::Restricted);
    }

    #[test]
    fn record_request_keeps_arbitrary_json() {
        let req: EncryptRecordRequest = serde_json::from_value(json!({
            "record": {"username": "bob", "apiKey": "sk-123"},
            "dataType": "integration"
        }))
        .unwrap();
        assert_eq!(req.record["apiKey"], "sk-123");
        assert_eq!(req.data_type, "integration");
    }

    #[test]
    fn record_response_omits_empty_still_encrypted() {
        let resp = RecordResponse {
            record: json!({"a": 1}),
            still_encrypted: vec![],
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("stillEncrypted").is_none());
    }

    #[test]
    fn error_response_from_service_error() {
        let e = ErrorResponse::from(&crate::ServiceError::DecryptionFailure);
        assert_eq!(e.code, "decryption_failed");
        assert_eq!(e.message, "decryption failed");
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            key_ready: true,
            record_types: 3,
        };
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("keyReady"));
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.record_types, 3);
    }
}
