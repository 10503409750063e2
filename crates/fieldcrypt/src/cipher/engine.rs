//! AES-256-GCM encryption and decryption of individual string values.
//!
//! **Nonces:** a fresh 96-bit nonce is drawn from the OS CSPRNG on every call.
//! GCM nonce reuse under one key is catastrophic (it breaks both
//! confidentiality and authentication), so nonces are never derived, counted
//! or cached.
//!
//! The tag is stored detached from the ciphertext, matching the envelope's
//! separate `authTag` field.

use std::sync::Arc;

use aes_gcm::{
    aead::{rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Nonce, Tag,
};
use chrono::Utc;
use common::{DataClassification, StoredEnvelope};
use tracing::{debug, info};

use super::envelope::{Envelope, EnvelopeVersion, Seal, NONCE_LEN, TAG_LEN};
use super::legacy::decrypt_legacy;
use crate::error::CryptoError;
use crate::key::{KeyProvider, MasterKey};

/// Algorithm name recorded in classified-record metadata.
pub const ALGORITHM: &str = "aes-256-gcm";

/// No associated data is bound today; see DESIGN.md on classification binding.
const ASSOCIATED_DATA: &[u8] = b"";

/// Encrypts values into [`Envelope`]s and decrypts them back.
///
/// Stateless apart from the shared, read-only key provider; clones are cheap
/// and calls from any number of threads need no coordination.
#[derive(Clone)]
pub struct CipherEngine {
    keys: Arc<dyn KeyProvider>,
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine").finish_non_exhaustive()
    }
}

impl CipherEngine {
    /// Create an engine that resolves its key through `keys`.
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    /// The injected key provider.
    pub fn key_provider(&self) -> &dyn KeyProvider {
        self.keys.as_ref()
    }

    /// Encrypt `plaintext` into a version-2 envelope.
    ///
    /// `classification` is recorded in the audit log only.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MissingKey`] if the key cannot be resolved and
    /// [`CryptoError::Encryption`] on an internal AEAD error.
    pub fn encrypt(
        &self,
        plaintext: &str,
        classification: DataClassification,
    ) -> Result<Envelope, CryptoError> {
        let key = self.keys.master_key()?;
        let cipher = build_cipher(&key);

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), ASSOCIATED_DATA, &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);

        info!(
            target: "fieldcrypt::audit",
            %classification,
            version = EnvelopeVersion::Current.number(),
            "value encrypted"
        );
        Ok(Envelope::current(buffer, nonce, tag_bytes, Utc::now()))
    }

    /// Decrypt a validated envelope.
    ///
    /// Dispatches on [`Envelope::version`] alone: current envelopes are
    /// authenticated here, legacy ones go to the CBC adapter.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] on any authentication or decoding
    /// failure, without saying which part of the envelope was at fault.
    pub fn decrypt(
        &self,
        envelope: &Envelope,
        classification: DataClassification,
    ) -> Result<String, CryptoError> {
        let key = self.keys.master_key()?;
        let plaintext = match envelope.seal() {
            Seal::Current { nonce, tag } => open_current(&key, nonce, tag, envelope.ciphertext())?,
            Seal::Legacy { iv } => decrypt_legacy(&key, iv, envelope.ciphertext())?,
        };
        info!(
            target: "fieldcrypt::audit",
            %classification,
            version = envelope.version().number(),
            "value decrypted"
        );
        Ok(plaintext)
    }

    /// Validate a stored envelope, then decrypt it.
    ///
    /// The version is checked before the key is resolved or any cipher runs.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedVersion`] or
    /// [`CryptoError::MalformedEnvelope`] for envelopes that fail validation,
    /// otherwise the errors of [`CipherEngine::decrypt`].
    pub fn decrypt_stored(
        &self,
        stored: &StoredEnvelope,
        classification: DataClassification,
    ) -> Result<String, CryptoError> {
        let envelope = Envelope::try_from(stored)?;
        self.decrypt(&envelope, classification)
    }
}

fn open_current(
    key: &MasterKey,
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let cipher = build_cipher(key);
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            ASSOCIATED_DATA,
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| {
            debug!("current envelope rejected: authentication failed");
            CryptoError::Decryption
        })?;
    // Authenticated bytes were produced from a `&str`, so this only fails for
    // envelopes sealed by some other writer.
    String::from_utf8(buffer).map_err(|_| CryptoError::Decryption)
}

fn build_cipher(key: &MasterKey) -> Aes256Gcm {
    Aes256Gcm::new(key.as_bytes().into())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::key::{HexKeyProvider, KeyError, MockKeyProvider, KEY_LEN};

    fn engine_with(byte: u8) -> CipherEngine {
        let provider = HexKeyProvider::from_hex(&format!("{byte:02x}").repeat(KEY_LEN)).unwrap();
        CipherEngine::new(Arc::new(provider))
    }

    fn flip_bit(encoded: &str, bit: usize) -> String {
        let mut bytes = hex::decode(encoded).unwrap();
        bytes[bit / 8] ^= 1 << (bit % 8);
        hex::encode(bytes)
    }

    #[test]
    fn round_trip_every_classification() {
        let engine = engine_with(0x42);
        for class in [
            DataClassification::Public,
            DataClassification::Internal,
            DataClassification::Confidential,
            DataClassification::Restricted,
        ] {
            for plaintext in ["", "123-45-6789", "naïve ✓ unicode", "x".repeat(4096).as_str()] {
                let env = engine.encrypt(plaintext, class).unwrap();
                assert_eq!(env.version(), EnvelopeVersion::Current);
                assert_eq!(engine.decrypt(&env, class).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn envelope_shape() {
        let env = engine_with(1).encrypt("hello", DataClassification::Internal).unwrap();
        let stored = env.to_stored();
        assert_eq!(stored.encryption_version, 2);
        assert_eq!(stored.iv.len(), NONCE_LEN * 2);
        assert_eq!(stored.auth_tag.as_ref().unwrap().len(), TAG_LEN * 2);
        assert_eq!(stored.ciphertext.len(), "hello".len() * 2);
    }

    #[test]
    fn nonces_never_repeat() {
        let engine = engine_with(0x42);
        let mut ivs = HashSet::new();
        let mut ciphertexts = HashSet::new();
        for _ in 0..10_000 {
            let env = engine.encrypt("same plaintext", DataClassification::Internal).unwrap();
            ivs.insert(env.iv().to_vec());
            ciphertexts.insert(env.ciphertext().to_vec());
        }
        assert_eq!(ivs.len(), 10_000);
        assert_eq!(ciphertexts.len(), 10_000);
    }

    #[test]
    fn one_engine_shared_across_threads() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let engine = engine_with(0x42);
        let ivs: Vec<Vec<u8>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let engine = &engine;
                    scope.spawn(move || {
                        let mut ivs = Vec::with_capacity(PER_THREAD);
                        for i in 0..PER_THREAD {
                            let plaintext = format!("value-{t}-{i}");
                            let env = engine
                                .encrypt(&plaintext, DataClassification::Confidential)
                                .unwrap();
                            let opened = engine
                                .decrypt(&env, DataClassification::Confidential)
                                .unwrap();
                            assert_eq!(opened, plaintext);
                            ivs.push(env.iv().to_vec());
                        }
                        ivs
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        assert_eq!(ivs.len(), THREADS * PER_THREAD);
        let distinct: HashSet<_> = ivs.into_iter().collect();
        assert_eq!(distinct.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let engine = engine_with(0x42);
        let class = DataClassification::Confidential;
        let stored = engine.encrypt("tamper me", class).unwrap().to_stored();

        for bit in 0..stored.ciphertext.len() * 4 {
            let mut t = stored.clone();
            t.ciphertext = flip_bit(&stored.ciphertext, bit);
            assert!(matches!(engine.decrypt_stored(&t, class), Err(CryptoError::Decryption)));
        }
        let tag = stored.auth_tag.clone().unwrap();
        for bit in 0..tag.len() * 4 {
            let mut t = stored.clone();
            t.auth_tag = Some(flip_bit(&tag, bit));
            assert!(matches!(engine.decrypt_stored(&t, class), Err(CryptoError::Decryption)));
        }
        for bit in 0..stored.iv.len() * 4 {
            let mut t = stored.clone();
            t.iv = flip_bit(&stored.iv, bit);
            assert!(matches!(engine.decrypt_stored(&t, class), Err(CryptoError::Decryption)));
        }
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let env = engine_with(1).encrypt("secret", DataClassification::Restricted).unwrap();
        assert!(matches!(
            engine_with(2).decrypt(&env, DataClassification::Restricted),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn unsupported_version_never_touches_key() {
        let mut keys = MockKeyProvider::new();
        keys.expect_master_key().never();
        let engine = CipherEngine::new(Arc::new(keys));

        let stored = StoredEnvelope {
            ciphertext: "00".into(),
            iv: "00".repeat(NONCE_LEN),
            auth_tag: Some("00".repeat(TAG_LEN)),
            encryption_version: 99,
            encrypted_at: Utc::now(),
        };
        assert!(matches!(
            engine.decrypt_stored(&stored, DataClassification::Public),
            Err(CryptoError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn malformed_envelope_never_touches_key() {
        let mut keys = MockKeyProvider::new();
        keys.expect_master_key().never();
        let engine = CipherEngine::new(Arc::new(keys));

        let stored = StoredEnvelope {
            ciphertext: "00".into(),
            iv: "00".repeat(16),
            auth_tag: Some("00".repeat(TAG_LEN)),
            encryption_version: 2,
            encrypted_at: Utc::now(),
        };
        assert!(matches!(
            engine.decrypt_stored(&stored, DataClassification::Public),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn legacy_version_uses_cbc_path() {
        let key = MasterKey::from_bytes(&[9u8; KEY_LEN]).unwrap();
        let iv = [5u8; 16];
        let ct = crate::cipher::legacy::encrypt_legacy_for_tests(&key, &iv, "from the old days");

        let mut keys = MockKeyProvider::new();
        let k = key.clone();
        keys.expect_master_key().times(1).returning(move || Ok(k.clone()));
        let engine = CipherEngine::new(Arc::new(keys));

        let stored = StoredEnvelope {
            ciphertext: hex::encode(&ct),
            iv: hex::encode(iv),
            auth_tag: None,
            encryption_version: 1,
            encrypted_at: Utc::now(),
        };
        assert_eq!(
            engine.decrypt_stored(&stored, DataClassification::Internal).unwrap(),
            "from the old days"
        );

        // The same bytes labelled as version 2 are not sniffed into the CBC path.
        let relabelled = StoredEnvelope {
            encryption_version: 2,
            ..stored
        };
        assert!(engine.decrypt_stored(&relabelled, DataClassification::Internal).is_err());
    }

    #[test]
    fn missing_key_propagates() {
        let mut keys = MockKeyProvider::new();
        keys.expect_master_key()
            .returning(|| Err(KeyError::Missing("ENCRYPTION_KEY".into())));
        let engine = CipherEngine::new(Arc::new(keys));
        assert!(matches!(
            engine.encrypt("x", DataClassification::Public),
            Err(CryptoError::MissingKey(KeyError::Missing(_)))
        ));
    }
}
