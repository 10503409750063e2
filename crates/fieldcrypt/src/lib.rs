//! `fieldcrypt`: versioned field-level authenticated encryption.
//!
//! ```text
//! FieldClassifier ──▶ CipherEngine ──▶ KeyProvider
//!        │                  │
//!        ▼                  └─ version 1 ─▶ legacy CBC (read only)
//!     Migrator ──▶ RotationPolicy
//! ```
//!
//! Values are sealed into an [`Envelope`] with AES-256-GCM. Envelopes written
//! by an older AES-256-CBC scheme remain readable and can be upgraded with the
//! [`Migrator`]. [`hash_for_indexing`] gives deterministic digests for
//! equality lookups on encrypted columns.

pub mod cipher;
pub mod classify;
pub mod error;
pub mod index;
pub mod key;
pub mod migrate;
pub mod rotation;

pub use cipher::{CipherEngine, Envelope, EnvelopeError, EnvelopeVersion, ALGORITHM};
pub use classify::{
    DecryptedRecord, FieldClassifier, FieldValue, Record, RuleError, RuleTable, SuffixRule,
};
pub use error::CryptoError;
pub use index::hash_for_indexing;
pub use key::{HexKeyProvider, KeyError, KeyProvider, MasterKey};
pub use migrate::Migrator;
pub use rotation::RotationPolicy;
