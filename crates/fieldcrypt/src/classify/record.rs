//! Result of decrypting a classified record.

use std::collections::BTreeMap;

use common::ENCRYPTION_METADATA_KEY;
use serde_json::Value;

use super::Record;

/// Outcome for a single top-level field of a decrypted record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The field was never encrypted and is returned as stored.
    Plain(Value),
    /// The field held an envelope that decrypted successfully.
    Decrypted(String),
    /// The field held an envelope that could not be decrypted. The stored
    /// value is returned unchanged.
    StillEncrypted(Value),
}

impl FieldValue {
    /// JSON value to place back into a record.
    pub fn into_value(self) -> Value {
        match self {
            FieldValue::Plain(v) | FieldValue::StillEncrypted(v) => v,
            FieldValue::Decrypted(s) => Value::String(s),
        }
    }
}

/// Per-field view of a record after [`FieldClassifier::decrypt_record`].
///
/// [`FieldClassifier::decrypt_record`]: super::FieldClassifier::decrypt_record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecryptedRecord {
    fields: BTreeMap<String, FieldValue>,
    metadata: Option<Value>,
}

impl DecryptedRecord {
    pub(crate) fn new(fields: BTreeMap<String, FieldValue>, metadata: Option<Value>) -> Self {
        Self { fields, metadata }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Names of fields left in envelope form, in key order.
    pub fn still_encrypted(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, v)| matches!(v, FieldValue::StillEncrypted(_)))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn is_fully_decrypted(&self) -> bool {
        !self
            .fields
            .values()
            .any(|v| matches!(v, FieldValue::StillEncrypted(_)))
    }

    /// Flatten into a plain JSON map.
    ///
    /// An `encrypted: true` marker is dropped once every field is plaintext,
    /// and kept while any field is still encrypted so the record can be
    /// retried. Any other `_encryption` value is not ours and is kept as is.
    pub fn into_record(self) -> Record {
        let marked = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("encrypted"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let keep_marker = !marked || !self.is_fully_decrypted();
        let mut record: Record = self
            .fields
            .into_iter()
            .map(|(k, v)| (k, v.into_value()))
            .collect();
        if keep_marker {
            if let Some(metadata) = self.metadata {
                record.insert(ENCRYPTION_METADATA_KEY.to_owned(), metadata);
            }
        }
        record
    }
}
