//! [`MasterKey`]: the 256-bit symmetric key every envelope is sealed under.

use zeroize::Zeroizing;

use super::KeyError;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// Cloned into cipher call stacks when needed; every copy is overwritten with
/// zeroes on drop.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let mut buf = Zeroizing::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Build a key from a 64-character hex string. Surrounding whitespace is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidEncoding`] for non-hex input and
    /// [`KeyError::InvalidLength`] if it decodes to anything but 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let raw = Zeroizing::new(hex::decode(encoded.trim()).map_err(|_| KeyError::InvalidEncoding)?);
        Self::from_bytes(&raw)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &*self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("MasterKey([REDACTED])")
    }
}
