//! Wire types, protocol definitions, and errors shared across `fieldcrypt` crates.

pub mod envelope;
pub mod error;
pub mod protocol;

pub use envelope::{DataClassification, EncryptionMetadata, StoredEnvelope, ENCRYPTION_METADATA_KEY};
pub use error::ServiceError;
