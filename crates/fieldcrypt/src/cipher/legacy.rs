//! Read-only support for version-1 envelopes (AES-256-CBC, PKCS#7).
//!
//! CBC carries no authentication: a corrupted ciphertext usually decrypts to
//! garbage rather than failing. The only detectable corruption is a broken
//! padding block, which surfaces as [`CryptoError::Decryption`].
//!
//! There is deliberately no encrypt function outside tests. New data is
//! always written as version 2.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use tracing::debug;

use super::envelope::LEGACY_IV_LEN;
use crate::error::CryptoError;
use crate::key::MasterKey;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Decrypt a legacy ciphertext.
///
/// Plaintext is decoded lossily: invalid UTF-8 from a corrupted block becomes
/// replacement characters, matching the scheme's no-integrity behaviour.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the padding is invalid.
pub(crate) fn decrypt_legacy(
    key: &MasterKey,
    iv: &[u8; LEGACY_IV_LEN],
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| CryptoError::Decryption)?;
    let plaintext = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| {
            debug!("legacy envelope rejected: invalid padding");
            CryptoError::Decryption
        })?;
    Ok(String::from_utf8_lossy(&plaintext).into_owned())
}

/// Produce a version-1 ciphertext. Test fixtures only.
#[cfg(test)]
pub(crate) fn encrypt_legacy_for_tests(
    key: &MasterKey,
    iv: &[u8; LEGACY_IV_LEN],
    plaintext: &str,
) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;

    cbc::Encryptor::<Aes256>::new_from_slices(key.as_bytes(), iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes())
}
