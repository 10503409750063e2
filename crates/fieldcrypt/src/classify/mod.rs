//! Record-level encryption driven by a [`RuleTable`].
//!
//! Only top-level string fields are ever encrypted. Nested objects, arrays,
//! numbers, booleans and nulls pass through whatever their name, and the
//! reserved `_encryption` key is never treated as data.
//!
//! [`FieldClassifier::decrypt_record`] is the one place in this crate that
//! swallows a decryption error: a field that fails stays in envelope form and
//! the rest of the record is still returned.

mod record;
pub mod rules;

pub use record::{DecryptedRecord, FieldValue};
pub use rules::{FragmentRule, RuleError, RuleTable, SuffixRule};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use common::{DataClassification, EncryptionMetadata, StoredEnvelope, ENCRYPTION_METADATA_KEY};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cipher::{CipherEngine, Envelope, ALGORITHM};
use crate::error::CryptoError;
use crate::migrate::Migrator;

/// A JSON object record.
pub type Record = serde_json::Map<String, Value>;

/// Classification used to decrypt a field no rule claims, e.g. after the rule
/// table changed.
const FALLBACK_CLASSIFICATION: DataClassification = DataClassification::Confidential;

/// Encrypts and decrypts the sensitive fields of JSON records.
#[derive(Debug, Clone)]
pub struct FieldClassifier {
    engine: CipherEngine,
    migrator: Migrator,
    rules: Arc<RuleTable>,
}

impl FieldClassifier {
    pub fn new(engine: CipherEngine, rules: Arc<RuleTable>) -> Self {
        Self {
            migrator: Migrator::new(engine.clone()),
            engine,
            rules,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Encrypt every sensitive string field of `record` and attach
    /// `_encryption` metadata.
    ///
    /// The result does not depend on key order. An `_encryption` key already
    /// present in `record` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MissingKey`] or [`CryptoError::Encryption`] from
    /// the engine. No partial record is returned.
    pub fn encrypt_record(&self, record: &Record, data_type: &str) -> Result<Record, CryptoError> {
        let mut out = Record::new();
        for (field, value) in record {
            if field == ENCRYPTION_METADATA_KEY {
                continue;
            }
            let sealed = match (value, self.rules.classify(data_type, field)) {
                (Value::String(plaintext), Some(classification)) => {
                    debug!(field = %field, %classification, "encrypting field");
                    envelope_value(&self.engine.encrypt(plaintext, classification)?)?
                }
                _ => value.clone(),
            };
            out.insert(field.clone(), sealed);
        }

        out.insert(ENCRYPTION_METADATA_KEY.to_owned(), self.metadata_for(data_type)?);
        Ok(out)
    }

    /// Decrypt every envelope-shaped field of a classified record.
    ///
    /// Records without `_encryption.encrypted == true` are returned with every
    /// field [`FieldValue::Plain`]. A field that fails to parse or decrypt is
    /// reported as [`FieldValue::StillEncrypted`] and logged by name only.
    pub fn decrypt_record(&self, record: &Record) -> DecryptedRecord {
        let metadata = record.get(ENCRYPTION_METADATA_KEY).cloned();
        let marked = metadata
            .as_ref()
            .and_then(|m| m.get("encrypted"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let data_type = metadata
            .as_ref()
            .and_then(|m| m.get("dataType"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        for (field, value) in record {
            if field == ENCRYPTION_METADATA_KEY {
                continue;
            }
            let outcome = if marked && StoredEnvelope::looks_like(value) {
                let classification = self
                    .rules
                    .classify(data_type, field)
                    .unwrap_or(FALLBACK_CLASSIFICATION);
                match self.open_field(value, classification) {
                    Ok(plaintext) => FieldValue::Decrypted(plaintext),
                    Err(e) => {
                        warn!(field = %field, error = %e, "field left encrypted");
                        FieldValue::StillEncrypted(value.clone())
                    }
                }
            } else {
                FieldValue::Plain(value.clone())
            };
            fields.insert(field.clone(), outcome);
        }
        DecryptedRecord::new(fields, metadata)
    }

    /// Upgrade every legacy envelope in a classified record to the current
    /// scheme. Current envelopes and plain fields are copied unchanged, and so
    /// is a record without the `_encryption` marker.
    ///
    /// When at least one field was re-encrypted the `_encryption` metadata is
    /// rewritten with the current algorithm, key version and timestamp. Its
    /// `dataType` is kept.
    ///
    /// # Errors
    ///
    /// The first field that fails to migrate aborts the call. The caller must
    /// then keep the stored record as it was.
    pub fn migrate_record(&self, record: &Record) -> Result<Record, CryptoError> {
        let Some(metadata) = record.get(ENCRYPTION_METADATA_KEY) else {
            return Ok(record.clone());
        };
        if metadata.get("encrypted").and_then(Value::as_bool) != Some(true) {
            return Ok(record.clone());
        }

        let mut out = Record::new();
        let mut upgraded_fields = 0usize;
        for (field, value) in record {
            let migrated = if field != ENCRYPTION_METADATA_KEY && StoredEnvelope::looks_like(value) {
                let envelope = parse_envelope(value)?;
                let upgraded = self.migrator.migrate_to_v2(&envelope)?;
                if upgraded == envelope {
                    value.clone()
                } else {
                    debug!(field = %field, "field migrated");
                    upgraded_fields += 1;
                    envelope_value(&upgraded)?
                }
            } else {
                value.clone()
            };
            out.insert(field.clone(), migrated);
        }

        if upgraded_fields > 0 {
            let data_type = metadata
                .get("dataType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            out.insert(ENCRYPTION_METADATA_KEY.to_owned(), self.metadata_for(data_type)?);
            debug!(fields = upgraded_fields, "record metadata refreshed");
        }
        Ok(out)
    }

    fn metadata_for(&self, data_type: &str) -> Result<Value, CryptoError> {
        let metadata = EncryptionMetadata {
            encrypted: true,
            encrypted_at: Utc::now(),
            data_type: data_type.to_owned(),
            algorithm: ALGORITHM.to_owned(),
            key_version: self.engine.key_provider().key_version(),
        };
        serde_json::to_value(metadata).map_err(|_| CryptoError::Encryption)
    }

    fn open_field(
        &self,
        value: &Value,
        classification: DataClassification,
    ) -> Result<String, CryptoError> {
        let envelope = parse_envelope(value)?;
        self.engine.decrypt(&envelope, classification)
    }
}

fn parse_envelope(value: &Value) -> Result<Envelope, CryptoError> {
    let stored: StoredEnvelope = serde_json::from_value(value.clone())
        .map_err(|_| CryptoError::MalformedEnvelope("field is not a valid envelope"))?;
    Ok(Envelope::try_from(stored)?)
}

fn envelope_value(envelope: &Envelope) -> Result<Value, CryptoError> {
    serde_json::to_value(envelope.to_stored()).map_err(|_| CryptoError::Encryption)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cipher::EnvelopeVersion;
    use crate::key::{KeyError, MockKeyProvider};
    use crate::migrate::tests::{engine, legacy_stored};

    fn classifier() -> FieldClassifier {
        FieldClassifier::new(engine(), Arc::new(RuleTable::builtin()))
    }

    fn object(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn encrypts_only_sensitive_fields() {
        let c = classifier();
        let input = object(json!({"username": "bob", "apiKey": "sk-123", "note": "hello"}));
        let sealed = c.encrypt_record(&input, "user").unwrap();

        assert_eq!(sealed["username"], json!("bob"));
        assert_eq!(sealed["note"], json!("hello"));
        assert!(StoredEnvelope::looks_like(&sealed["apiKey"]));
        assert_eq!(sealed["apiKey"]["encryptionVersion"], json!(2));

        let opened = c.decrypt_record(&sealed);
        assert!(opened.is_fully_decrypted());
        assert_eq!(opened.get("apiKey"), Some(&FieldValue::Decrypted("sk-123".into())));
        assert_eq!(opened.into_record(), input);
    }

    #[test]
    fn attaches_metadata() {
        let c = classifier();
        let sealed = c
            .encrypt_record(&object(json!({"email": "a@b.c"})), "user")
            .unwrap();
        let metadata: EncryptionMetadata =
            serde_json::from_value(sealed[ENCRYPTION_METADATA_KEY].clone()).unwrap();
        assert!(metadata.encrypted);
        assert_eq!(metadata.data_type, "user");
        assert_eq!(metadata.algorithm, "aes-256-gcm");
        assert_eq!(metadata.key_version, 1);
        assert!(StoredEnvelope::looks_like(&sealed["email"]));
    }

    #[test]
    fn non_string_values_pass_through() {
        let c = classifier();
        let input = object(json!({
            "password": null,
            "secretCount": 3,
            "tokens": ["a", "b"],
            "credentials": {"user": "x"},
            "ssn": true
        }));
        let sealed = c.encrypt_record(&input, "user").unwrap();
        for (field, value) in &input {
            assert_eq!(&sealed[field], value, "{field} changed");
        }
    }

    #[test]
    fn key_order_does_not_matter() {
        let c = classifier();
        let mut a = Record::new();
        a.insert("password".into(), json!("p"));
        a.insert("name".into(), json!("n"));
        let mut b = Record::new();
        b.insert("name".into(), json!("n"));
        b.insert("password".into(), json!("p"));

        let sa = c.encrypt_record(&a, "user").unwrap();
        let sb = c.encrypt_record(&b, "user").unwrap();
        let ka: BTreeMap<_, _> = sa.iter().map(|(k, v)| (k, StoredEnvelope::looks_like(v))).collect();
        let kb: BTreeMap<_, _> = sb.iter().map(|(k, v)| (k, StoredEnvelope::looks_like(v))).collect();
        assert_eq!(ka, kb);
        assert_eq!(c.decrypt_record(&sa).into_record(), c.decrypt_record(&sb).into_record());
    }

    #[test]
    fn one_broken_field_does_not_break_the_record() {
        let c = classifier();
        let input = object(json!({"password": "hunter2", "apiKey": "sk-1", "name": "bob"}));
        let mut sealed = c.encrypt_record(&input, "user").unwrap();

        let mut broken = sealed["password"].clone();
        let tag = broken["authTag"].as_str().unwrap().to_owned();
        let flipped = if tag.starts_with('0') { "1" } else { "0" };
        broken["authTag"] = json!(format!("{flipped}{}", &tag[1..]));
        sealed.insert("password".into(), broken.clone());

        let opened = c.decrypt_record(&sealed);
        assert_eq!(opened.still_encrypted(), vec!["password"]);
        assert_eq!(opened.get("apiKey"), Some(&FieldValue::Decrypted("sk-1".into())));
        assert_eq!(opened.get("name"), Some(&FieldValue::Plain(json!("bob"))));

        let flat = opened.into_record();
        assert_eq!(flat["password"], broken);
        assert!(flat.contains_key(ENCRYPTION_METADATA_KEY));
    }

    #[test]
    fn unmarked_record_is_not_decrypted() {
        let c = classifier();
        let envelope = c.engine.encrypt("x", DataClassification::Internal).unwrap();
        let record = object(json!({"password": envelope_value(&envelope).unwrap()}));
        let opened = c.decrypt_record(&record);
        assert!(matches!(opened.get("password"), Some(FieldValue::Plain(_))));
    }

    #[test]
    fn encrypt_propagates_missing_key() {
        let mut keys = MockKeyProvider::new();
        keys.expect_master_key()
            .returning(|| Err(KeyError::Missing("ENCRYPTION_KEY".into())));
        let c = FieldClassifier::new(CipherEngine::new(Arc::new(keys)), Arc::new(RuleTable::builtin()));
        assert!(matches!(
            c.encrypt_record(&object(json!({"password": "x"})), "user"),
            Err(CryptoError::MissingKey(_))
        ));
    }

    #[test]
    fn migrate_record_upgrades_legacy_fields() {
        let c = classifier();
        let record = object(json!({
            "name": "bob",
            "password": serde_json::to_value(legacy_stored("hunter2")).unwrap(),
            "_encryption": {
                "encrypted": true,
                "encryptedAt": "2021-05-01T00:00:00Z",
                "dataType": "user",
                "algorithm": "aes-256-cbc",
                "keyVersion": 0
            }
        }));

        let migrated = c.migrate_record(&record).unwrap();
        assert_eq!(migrated["password"]["encryptionVersion"], json!(2));
        assert_eq!(migrated["name"], json!("bob"));

        let metadata: EncryptionMetadata =
            serde_json::from_value(migrated[ENCRYPTION_METADATA_KEY].clone()).unwrap();
        assert!(metadata.encrypted);
        assert_eq!(metadata.algorithm, "aes-256-gcm");
        assert_eq!(metadata.key_version, 1);
        assert_eq!(metadata.data_type, "user");
        let stale: chrono::DateTime<Utc> = "2021-05-01T00:00:00Z".parse().unwrap();
        assert!(metadata.encrypted_at > stale);

        let again = c.migrate_record(&migrated).unwrap();
        assert_eq!(again, migrated);

        let opened = c.decrypt_record(&migrated);
        assert_eq!(opened.get("password"), Some(&FieldValue::Decrypted("hunter2".into())));
    }

    #[test]
    fn migrate_record_fails_on_bad_field() {
        let c = classifier();
        let mut stored = legacy_stored("abc");
        let mut iv = hex::decode(&stored.iv).unwrap();
        iv[15] ^= 0x80;
        stored.iv = hex::encode(iv);
        let record = object(json!({
            "password": serde_json::to_value(stored).unwrap(),
            "_encryption": {"encrypted": true}
        }));
        assert!(matches!(c.migrate_record(&record), Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypts_legacy_fields() {
        let c = classifier();
        let record = object(json!({
            "password": serde_json::to_value(legacy_stored("old")).unwrap(),
            "_encryption": {"encrypted": true, "dataType": "user"}
        }));
        let opened = c.decrypt_record(&record);
        assert_eq!(opened.get("password"), Some(&FieldValue::Decrypted("old".into())));
        let version = Envelope::try_from(legacy_stored("old")).unwrap().version();
        assert_eq!(version, EnvelopeVersion::Legacy);
    }

    #[test]
    fn unmarked_metadata_survives_decrypt() {
        let c = classifier();
        let record = object(json!({
            "_encryption": {"encrypted": false, "note": "keep"},
            "name": "bob"
        }));
        let opened = c.decrypt_record(&record);
        assert!(opened.is_fully_decrypted());
        assert_eq!(opened.into_record(), record);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn logs_never_carry_plaintext_or_key() {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let c = classifier();
            let envelope = c
                .engine
                .encrypt("plaintext-marker-4417", DataClassification::Restricted)
                .unwrap();
            assert_eq!(
                c.engine.decrypt(&envelope, DataClassification::Restricted).unwrap(),
                "plaintext-marker-4417"
            );

            let input = object(json!({"password": "hunter2-marker", "apiKey": "sk-marker-99"}));
            let mut sealed = c.encrypt_record(&input, "user").unwrap();
            let mut broken = sealed["password"].clone();
            broken["ciphertext"] = json!("00");
            sealed.insert("password".into(), broken);
            let opened = c.decrypt_record(&sealed);
            assert_eq!(opened.still_encrypted(), vec!["password"]);
        });

        let logs = buffer.contents();
        assert!(logs.contains("value encrypted"));
        assert!(logs.contains("field left encrypted"));
        assert!(logs.contains("password"));
        for secret in ["plaintext-marker-4417", "hunter2-marker", "sk-marker-99"] {
            assert!(!logs.contains(secret), "{secret} leaked into logs");
        }
        let key_hex = hex::encode([crate::migrate::tests::KEY_BYTE; 32]);
        assert!(!logs.to_lowercase().contains(&key_hex));
    }
}
