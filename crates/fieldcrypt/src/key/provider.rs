//! [`HexKeyProvider`]: master key decoded from a single hex-encoded setting.

use super::{KeyError, KeyProvider, MasterKey};

/// Setting that holds the key, named in [`KeyError::Missing`].
pub const DEFAULT_KEY_ENV: &str = "ENCRYPTION_KEY";

/// Key provider backed by a 64-character hex string.
///
/// The string is validated when the provider is built, so a missing or
/// malformed key fails at startup rather than on the first request.
#[derive(Debug, Clone)]
pub struct HexKeyProvider {
    key: MasterKey,
    version: u32,
}

impl HexKeyProvider {
    /// Build a provider from a hex-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Missing`] for an empty string, otherwise the
    /// decoding errors of [`MasterKey::from_hex`].
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        if encoded.trim().is_empty() {
            return Err(KeyError::Missing(DEFAULT_KEY_ENV.into()));
        }
        Ok(Self {
            key: MasterKey::from_hex(encoded)?,
            version: 1,
        })
    }

    /// Set the label reported by [`KeyProvider::key_version`].
    pub fn with_key_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl KeyProvider for HexKeyProvider {
    fn master_key(&self) -> Result<MasterKey, KeyError> {
        Ok(self.key.clone())
    }

    fn key_version(&self) -> u32 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_LEN;

    #[test]
    fn from_hex_round_trip() {
        let provider = HexKeyProvider::from_hex(&"42".repeat(KEY_LEN)).unwrap();
        let key = provider.master_key().unwrap();
        assert_eq!(key.as_bytes(), &[0x42u8; KEY_LEN]);
        assert_eq!(provider.key_version(), 1);
    }

    #[test]
    fn from_hex_rejects_empty_as_missing() {
        assert!(matches!(
            HexKeyProvider::from_hex("   "),
            Err(KeyError::Missing(_))
        ));
    }

    #[test]
    fn from_hex_rejects_short_key() {
        assert!(matches!(
            HexKeyProvider::from_hex(&"42".repeat(16)),
            Err(KeyError::InvalidLength(16))
        ));
    }

    #[test]
    fn key_version_is_configurable() {
        let provider = HexKeyProvider::from_hex(&"42".repeat(KEY_LEN))
            .unwrap()
            .with_key_version(3);
        assert_eq!(provider.key_version(), 3);
    }
}
