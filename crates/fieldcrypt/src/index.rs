//! Deterministic digests for equality search over encrypted columns.
//!
//! The digest is unsalted SHA-256, so equal inputs always collide and can be
//! looked up without decrypting anything. The same property makes guessable
//! inputs (emails, phone numbers) open to dictionary attacks. This is not a
//! substitute for [`CipherEngine`](crate::cipher::CipherEngine), and secrets
//! with real entropy (passwords, API keys) must never be indexed this way.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `plaintext`'s UTF-8 bytes.
pub fn hash_for_indexing(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
