//! Axum request handlers for all service endpoints.
//!
//! Handlers are thin: they validate the request shape, call into `fieldcrypt`
//! and turn any error into a [`ServiceError`] response body. Plaintext values
//! never reach a log line from this module.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{
        DecryptValueRequest, DecryptValueResponse, EncryptRecordRequest, EncryptValueRequest,
        EnvelopeRequest, EnvelopeResponse, ErrorResponse, HealthResponse, IndexHashRequest,
        IndexHashResponse, RecordRequest, RecordResponse, RotationResponse,
    },
    ServiceError,
};
use fieldcrypt::{hash_for_indexing, Envelope, Record};
use serde_json::Value;
use tracing::warn;

use super::state::AppState;

// ---------------------------------------------------------------------------
// Single values
// ---------------------------------------------------------------------------

/// `POST /v1/encrypt`: seal one value into a version-2 envelope.
pub async fn encrypt(
    State(state): State<AppState>,
    body: Result<Json<EncryptValueRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match state.engine.encrypt(&req.value, req.classification) {
        Ok(envelope) => ok(EnvelopeResponse {
            envelope: envelope.to_stored(),
            reencrypted: false,
        }),
        Err(e) => error_response(e.into()),
    }
}

/// `POST /v1/decrypt`: open one envelope.
///
/// Tampering and wrong-key failures both surface as the same opaque 422.
pub async fn decrypt(
    State(state): State<AppState>,
    body: Result<Json<DecryptValueRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match state.engine.decrypt_stored(&req.envelope, req.classification) {
        Ok(value) => ok(DecryptValueResponse { value }),
        Err(e) => error_response(e.into()),
    }
}

/// `POST /v1/migrate`: upgrade a legacy envelope; current envelopes come back
/// unchanged with `reencrypted: false`.
pub async fn migrate(
    State(state): State<AppState>,
    body: Result<Json<EnvelopeRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let envelope = match Envelope::try_from(&req.envelope) {
        Ok(envelope) => envelope,
        Err(e) => return error_response(fieldcrypt::CryptoError::from(e).into()),
    };
    match state.migrator.migrate_to_v2(&envelope) {
        Ok(migrated) => ok(EnvelopeResponse {
            reencrypted: migrated != envelope,
            envelope: migrated.to_stored(),
        }),
        Err(e) => error_response(e.into()),
    }
}

/// `POST /v1/rotation`: report whether an envelope is past the rotation age.
pub async fn rotation(
    State(state): State<AppState>,
    body: Result<Json<EnvelopeRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match Envelope::try_from(&req.envelope) {
        Ok(envelope) => ok(RotationResponse {
            needs_rotation: state.rotation.needs_rotation(&envelope),
        }),
        Err(e) => error_response(fieldcrypt::CryptoError::from(e).into()),
    }
}

/// `POST /v1/index-hash`: deterministic digest for equality lookups.
pub async fn index_hash(body: Result<Json<IndexHashRequest>, JsonRejection>) -> Response {
    match parse(body) {
        Ok(req) => ok(IndexHashResponse {
            digest: hash_for_indexing(&req.value),
        }),
        Err(resp) => resp,
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// `POST /v1/records/encrypt`: encrypt the sensitive fields of a record.
pub async fn encrypt_record(
    State(state): State<AppState>,
    body: Result<Json<EncryptRecordRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let record = match as_record(req.record) {
        Ok(record) => record,
        Err(resp) => return resp,
    };
    match state.classifier.encrypt_record(&record, &req.data_type) {
        Ok(sealed) => ok(RecordResponse {
            record: Value::Object(sealed),
            still_encrypted: Vec::new(),
        }),
        Err(e) => error_response(e.into()),
    }
}

/// `POST /v1/records/decrypt`: decrypt a classified record.
///
/// Always `200`: fields that fail are returned in envelope form and listed in
/// `stillEncrypted`.
pub async fn decrypt_record(
    State(state): State<AppState>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let record = match as_record(req.record) {
        Ok(record) => record,
        Err(resp) => return resp,
    };
    let decrypted = state.classifier.decrypt_record(&record);
    let still_encrypted = decrypted
        .still_encrypted()
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    if !still_encrypted.is_empty() {
        warn!(fields = ?still_encrypted, "record partially decrypted");
    }
    ok(RecordResponse {
        record: Value::Object(decrypted.into_record()),
        still_encrypted,
    })
}

/// `POST /v1/records/migrate`: upgrade every legacy envelope in a record.
pub async fn migrate_record(
    State(state): State<AppState>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> Response {
    let req = match parse(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let record = match as_record(req.record) {
        Ok(record) => record,
        Err(resp) => return resp,
    };
    match state.classifier.migrate_record(&record) {
        Ok(migrated) => ok(RecordResponse {
            record: Value::Object(migrated),
            still_encrypted: Vec::new(),
        }),
        Err(e) => error_response(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Health and fallback
// ---------------------------------------------------------------------------

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when the master key resolves and `503 Service
/// Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let key_ready = state.key_ready();
    let (status_code, status_str) = if key_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_ready,
        record_types: state.classifier.rules().record_type_count(),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(code = err.code(), error = %err, "request failed");
    }
    (status, Json(ErrorResponse::from(&err))).into_response()
}

fn parse<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(req)| req)
        .map_err(|rejection| error_response(ServiceError::BadRequest(rejection.body_text())))
}

fn as_record(value: Value) -> Result<Record, Response> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(error_response(ServiceError::BadRequest(
            "record must be a JSON object".into(),
        ))),
    }
}
